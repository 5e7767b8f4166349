use std::error::Error;
use std::io;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use crossterm::{ExecutableCommand, execute};
use rand::seq::SliceRandom;
use rand::thread_rng;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs};
use ratatui::{Frame, Terminal};
use tracing::{info, warn};

use crate::currency::BASE_CURRENCY;
use crate::expenses::{EXPENSE_CATEGORIES, ExpenseLedger, FormField, category_info};
use crate::schedule::Itinerary;
use crate::storage::CompletionStore;
use crate::tasks::{TaskEvent, TaskRunner};
use crate::trip::{DayPlan, TimelineEntry, Trip};

const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);
const DONE_COLOR: Color = Color::Green;
const ERROR_COLOR: Color = Color::LightRed;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CELEBRATION_CAPTIONS: [&str; 5] = [
	"Nice, another stop done!",
	"Checked off. Onward!",
	"That one's in the memories now.",
	"Great pace today!",
	"One more for the album.",
];

/// Mutable state shared by the dashboard's key handlers.
struct Session<'a, S> {
	trip: &'a Trip,
	itinerary: &'a mut Itinerary<S>,
	ledger: ExpenseLedger,
	tasks: TaskRunner,
}

pub fn run_dashboard<S: CompletionStore>(
	trip: &Trip,
	itinerary: &mut Itinerary<S>,
	tasks: TaskRunner,
) -> Result<(), Box<dyn Error>> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let mut session = Session {
		trip,
		itinerary,
		ledger: ExpenseLedger::new(),
		tasks,
	};
	session.tasks.spawn_startup();
	let result = run_event_loop(&mut terminal, &mut session);

	session.itinerary.teardown();
	session.tasks.teardown();

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop<S: CompletionStore>(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	session: &mut Session<'_, S>,
) -> Result<(), Box<dyn Error>> {
	let mut app = App::default();

	loop {
		session.itinerary.sync(session.trip);
		session.itinerary.tick(Instant::now());
		for task_event in session.tasks.drain() {
			apply_task_event(&mut app, &mut session.ledger, task_event);
		}
		app.clamp_selection(session);
		terminal.draw(|frame| draw_dashboard(frame, &app, session))?;

		if event::poll(POLL_INTERVAL)? {
			if let CEvent::Key(key) = event::read()? {
				if key.kind != KeyEventKind::Press {
					continue;
				}

				let should_quit = match &app.mode {
					InputMode::Prompt(_) => handle_prompt_key(&mut app, key.code, session),
					InputMode::Select(_) => handle_select_key(&mut app, key.code, session),
					InputMode::Normal => handle_normal_key(&mut app, key.code, session),
				};

				if should_quit {
					break;
				}
			}
		}
	}

	Ok(())
}

fn apply_task_event(app: &mut App, ledger: &mut ExpenseLedger, task_event: TaskEvent) {
	match task_event {
		TaskEvent::Loaded(result) => match ledger.apply_loaded(result) {
			Ok(()) => app.status = format!("Loaded {} expenses", ledger.records().len()),
			Err(err) => app.status = format!("error: {err}"),
		},
		TaskEvent::Rates(result) => {
			if ledger.apply_rates(result).is_ok() {
				info!("exchange rates loaded");
			}
		}
		TaskEvent::Mutated(result) => match ledger.finish(result) {
			Ok(message) => app.status = ledger.take_notice().unwrap_or(message),
			Err(err) => app.status = format!("error: {err}"),
		},
	}
}

fn draw_dashboard<S: CompletionStore>(frame: &mut Frame, app: &App, session: &Session<'_, S>) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(3), Constraint::Min(12), Constraint::Length(5)])
		.split(frame.area());

	let tabs = Tabs::new(vec![Line::from(" Itinerary "), Line::from(" Expenses ")])
		.select(app.tab.index())
		.block(Block::default().borders(Borders::ALL).title("Trip ledger"))
		.highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD));
	frame.render_widget(tabs, layout[0]);

	match app.tab {
		MainTab::Itinerary => render_itinerary_tab(frame, layout[1], app, session),
		MainTab::Ledger => render_ledger_tab(frame, layout[1], app, &session.ledger, session.trip),
	}
	render_footer(frame, layout[2], app, session);

	if let InputMode::Select(select) = &app.mode {
		render_select_popup(frame, select);
	}
}

fn render_itinerary_tab<S: CompletionStore>(frame: &mut Frame, area: Rect, app: &App, session: &Session<'_, S>) {
	let sections = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(3), Constraint::Min(6)])
		.split(area);

	let trip = session.trip;
	let day_titles = trip
		.days
		.iter()
		.enumerate()
		.map(|(index, day)| Line::from(format!("Day {} {} {}", index + 1, day.date.format("%m/%d"), day.weekday)))
		.collect::<Vec<_>>();
	let day_tabs = Tabs::new(day_titles)
		.select(session.itinerary.current_index(trip))
		.block(Block::default().borders(Borders::ALL).title("Days (h/l)"))
		.highlight_style(Style::default().fg(FOCUSED_PANEL_BORDER_COLOR).add_modifier(Modifier::BOLD));
	frame.render_widget(day_tabs, sections[0]);

	let Some(day) = session.itinerary.current_day(trip) else {
		let empty = Paragraph::new("No days planned for this trip").block(Block::default().borders(Borders::ALL));
		frame.render_widget(empty, sections[1]);
		return;
	};

	let completion = session.itinerary.completion();
	let visit_total = day.visits().count();
	let visit_done = completion.completed_count(day.visits().map(|visit| visit.id.as_str()));
	let bulk_hint = if !day.has_visits() {
		String::new()
	} else if session.itinerary.bulk().expand() {
		" | a collapse all".to_string()
	} else {
		" | a expand all".to_string()
	};
	let title = format!("{} | {visit_done}/{visit_total} visited{bulk_hint}", day.title);

	let items = day
		.items
		.iter()
		.map(|entry| ListItem::new(timeline_entry_text(entry, session)))
		.collect::<Vec<_>>();
	let mut state = ListState::default();
	if !items.is_empty() {
		state.select(Some(app.timeline_index.min(items.len() - 1)));
	}

	let list = List::new(if items.is_empty() {
		vec![ListItem::new("(nothing planned)")]
	} else {
		items
	})
	.block(
		Block::default()
			.borders(Borders::ALL)
			.title(title)
			.border_style(border_style(true)),
	)
	.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	frame.render_stateful_widget(list, sections[1], &mut state);
}

fn timeline_entry_text<S: CompletionStore>(entry: &TimelineEntry, session: &Session<'_, S>) -> Text<'static> {
	match entry {
		TimelineEntry::Visit(visit) => {
			let completed = session.itinerary.completion().is_completed(&visit.id);
			let card = session.itinerary.card(&visit.id);
			let expanded = card.is_some_and(|card| card.expanded());
			let celebrating = card.is_some_and(|card| card.celebrating());

			let marker = if completed { "[x]" } else { "[ ]" };
			let name_style = if completed {
				Style::default().fg(DONE_COLOR).add_modifier(Modifier::CROSSED_OUT)
			} else {
				Style::default().add_modifier(Modifier::BOLD)
			};
			let mut header = vec![
				Span::raw(format!("{} {marker} {} ", visit.time, visit.emoji)),
				Span::styled(visit.name.clone(), name_style),
				Span::styled(format!("  {}", visit.category.label()), Style::default().fg(Color::DarkGray)),
				Span::raw(if expanded { "  ▾" } else { "  ▸" }),
			];
			if celebrating {
				header.push(Span::styled("  🎉", Style::default().fg(Color::Yellow)));
			}

			let mut lines = vec![Line::from(header)];
			if expanded {
				if let Some(note) = &visit.note {
					lines.push(Line::from(format!("        {note}")));
				}
				if let Some(image) = &visit.image {
					lines.push(Line::styled(format!("        photo: {image}"), Style::default().fg(Color::DarkGray)));
				}
				if let Some(map_url) = &visit.map_url {
					lines.push(Line::styled(format!("        map: {map_url}"), Style::default().fg(Color::Cyan)));
				}
			}
			Text::from(lines)
		}
		TimelineEntry::Transit(transit) => Text::from(Line::styled(
			format!("        ↓ {} {}", transit.icon, transit.duration),
			Style::default().fg(Color::DarkGray),
		)),
		TimelineEntry::Reminder(reminder) => {
			let mut lines = vec![Line::styled(
				format!("{} (!) {} {}", reminder.time, reminder.emoji, reminder.name),
				Style::default().fg(Color::LightYellow),
			)];
			if let Some(note) = &reminder.note {
				lines.push(Line::from(format!("        {note}")));
			}
			if let Some(url) = &reminder.url {
				lines.push(Line::styled(format!("        link: {url}"), Style::default().fg(Color::Cyan)));
			}
			Text::from(lines)
		}
	}
}

fn render_ledger_tab(frame: &mut Frame, area: Rect, app: &App, ledger: &ExpenseLedger, trip: &Trip) {
	let columns = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(36), Constraint::Percentage(64)])
		.split(area);
	let left = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Min(8), Constraint::Length(8)])
		.split(columns[0]);

	render_summary_panel(frame, left[0], ledger);
	render_form_panel(frame, left[1], ledger);
	render_expense_list(frame, columns[1], app, ledger, trip);
}

fn render_summary_panel(frame: &mut Frame, area: Rect, ledger: &ExpenseLedger) {
	let mut lines = Vec::new();
	if let Some(banner) = ledger.banner() {
		lines.push(Line::styled(banner.to_string(), Style::default().fg(ERROR_COLOR).add_modifier(Modifier::BOLD)));
	}

	let currency = ledger.currency();
	lines.push(Line::from(vec![
		Span::raw("Total "),
		Span::styled(
			ledger.display_amount(ledger.total()),
			Style::default().fg(FOCUSED_PANEL_BORDER_COLOR).add_modifier(Modifier::BOLD),
		),
		Span::styled(format!("  {}", currency.label()), Style::default().fg(Color::DarkGray)),
	]));
	if currency != BASE_CURRENCY {
		let rate_line = if ledger.rates_loading() {
			"rates loading…".to_string()
		} else {
			ledger
				.rates_note()
				.unwrap_or_else(|| format!("rates unavailable, showing {BASE_CURRENCY}"))
		};
		lines.push(Line::styled(rate_line, Style::default().fg(Color::DarkGray)));
	}
	lines.push(Line::from(""));

	for (category, total) in ledger.category_totals() {
		lines.push(Line::from(format!(
			"{} {:<14} {}",
			category.emoji,
			category.label,
			ledger.display_amount(total)
		)));
	}

	let title = if ledger.is_loading() {
		"Summary (loading…)"
	} else {
		"Summary"
	};
	let summary = Paragraph::new(lines).block(
		Block::default()
			.borders(Borders::ALL)
			.title(title)
			.border_style(border_style(false)),
	);
	frame.render_widget(summary, area);
}

fn render_form_panel(frame: &mut Frame, area: Rect, ledger: &ExpenseLedger) {
	let form = &ledger.form;
	let errors = ledger.form_errors();
	let field_line = |label: &str, value: &str, field: FormField| {
		let style = if errors.contains(&field) {
			Style::default().fg(ERROR_COLOR)
		} else {
			Style::default()
		};
		let shown = if value.is_empty() { "-" } else { value };
		Line::from(vec![Span::raw(format!("{label:<9}")), Span::styled(shown.to_string(), style)])
	};
	let category = category_info(&form.category)
		.map(|category| format!("{} {}", category.emoji, category.label))
		.unwrap_or_else(|| form.category.clone());

	let lines = vec![
		field_line("Date", &form.purchase_date, FormField::PurchaseDate),
		field_line("Item", &form.product_name, FormField::ItemName),
		field_line("Category", &category, FormField::Category),
		field_line("Price", &form.price, FormField::Price),
	];

	let mut title = match ledger.editing_id() {
		Some(id) => format!("Editing #{id} (x cancel)"),
		None => "New expense (n)".to_string(),
	};
	if ledger.is_submitting() {
		title.push_str(" saving…");
	}
	let panel = Paragraph::new(lines).block(
		Block::default()
			.borders(Borders::ALL)
			.title(title)
			.border_style(border_style(ledger.editing_id().is_some())),
	);
	frame.render_widget(panel, area);
}

fn render_expense_list(frame: &mut Frame, area: Rect, app: &App, ledger: &ExpenseLedger, trip: &Trip) {
	let records = ledger.visible_records();
	let items = records
		.iter()
		.map(|record| {
			let category = category_info(&record.category);
			let emoji = category.map(|category| category.emoji).unwrap_or("•");
			let mut style = Style::default();
			if ledger.editing_id() == Some(record.id.as_str()) {
				style = style.fg(FOCUSED_PANEL_BORDER_COLOR);
			}
			if ledger.pending_delete() == Some(record.id.as_str()) {
				style = style.fg(ERROR_COLOR);
			}
			ListItem::new(Line::from(vec![
				Span::styled(purchase_date_label(trip, record.purchase_date), Style::default().fg(Color::DarkGray)),
				Span::raw(format!(" {emoji} ")),
				Span::styled(record.product_name.clone(), style),
				Span::raw(format!("  {}", ledger.display_amount(record.price))),
			]))
		})
		.collect::<Vec<_>>();

	let mut state = ListState::default();
	if !items.is_empty() {
		state.select(Some(app.expense_index.min(items.len() - 1)));
	}

	let title = match ledger.filter_date() {
		Some(date) => format!("Expenses on {} ({})", date.format("%Y-%m-%d"), records.len()),
		None => format!("Expenses ({})", records.len()),
	};
	let empty_label = if ledger.is_loading() {
		"(loading…)"
	} else {
		"(no expenses yet)"
	};
	let list = List::new(if items.is_empty() {
		vec![ListItem::new(empty_label)]
	} else {
		items
	})
	.block(
		Block::default()
			.borders(Borders::ALL)
			.title(title)
			.border_style(border_style(true)),
	)
	.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer<S: CompletionStore>(frame: &mut Frame, area: Rect, app: &App, session: &Session<'_, S>) {
	let footer_lines = match &app.mode {
		InputMode::Normal => {
			let keys = match app.tab {
				MainTab::Itinerary => "h/l day | 1-9 jump | j/k move | space visited | Enter expand/collapse | a all",
				MainTab::Ledger => "j/k move | n new | e edit | d delete | x cancel edit | c currency | f filter date",
			};
			let mut status = vec![Span::raw(app.status.clone())];
			if let Some(caption) = app.active_celebration(session) {
				status.push(Span::styled(format!(" | 🎉 {caption}"), Style::default().fg(Color::Yellow)));
			}
			vec![
				Line::from("Tab switch view | q quit"),
				Line::from(keys),
				Line::from(status),
			]
		}
		InputMode::Prompt(prompt) => vec![
			Line::from(prompt.title.clone()),
			Line::from(format!("> {}", prompt.input)),
			Line::from("Enter submit | Esc cancel"),
		],
		InputMode::Select(select) => vec![
			Line::from(select.title.clone()),
			Line::from(format!(
				"Selected: {}",
				select
					.selected_option()
					.map(|option| option.label.as_str())
					.unwrap_or("(none)")
			)),
			Line::from("j/k or arrows move | Enter choose | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines).block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_select_popup(frame: &mut Frame, select: &SelectState) {
	let area = centered_rect(62, 55, frame.area());
	frame.render_widget(Clear, area);

	let items = if select.options.is_empty() {
		vec![ListItem::new("(no choices)")]
	} else {
		select
			.options
			.iter()
			.map(|option| ListItem::new(option.label.clone()).style(option.style))
			.collect::<Vec<_>>()
	};

	let current = if select.options.is_empty() {
		0
	} else {
		select.selected.saturating_add(1)
	};
	let total = select.options.len();
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!("{} ({current}/{total})", select.title)),
		)
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	let mut state = ListState::default();
	if !select.options.is_empty() {
		state.select(Some(select.selected.min(select.options.len().saturating_sub(1))));
	}
	frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn handle_normal_key<S: CompletionStore>(app: &mut App, code: KeyCode, session: &mut Session<'_, S>) -> bool {
	match code {
		KeyCode::Char('q') => return true,
		KeyCode::Tab | KeyCode::BackTab => {
			app.tab = app.tab.next();
			app.status = format!("{} view", app.tab.label());
			return false;
		}
		_ => {}
	}

	match app.tab {
		MainTab::Itinerary => handle_itinerary_key(app, code, session),
		MainTab::Ledger => handle_ledger_key(app, code, session),
	}
	false
}

fn handle_itinerary_key<S: CompletionStore>(app: &mut App, code: KeyCode, session: &mut Session<'_, S>) {
	let trip = session.trip;
	match code {
		KeyCode::Left | KeyCode::Char('h') => {
			session.itinerary.step_day(-1, trip);
			app.timeline_index = 0;
		}
		KeyCode::Right | KeyCode::Char('l') => {
			session.itinerary.step_day(1, trip);
			app.timeline_index = 0;
		}
		KeyCode::Char(digit @ '1'..='9') => {
			let index = i64::from(digit.to_digit(10).unwrap_or(1)) - 1;
			session.itinerary.select_day(index, trip);
			app.timeline_index = 0;
		}
		KeyCode::Up | KeyCode::Char('k') => {
			app.timeline_index = app.timeline_index.saturating_sub(1);
		}
		KeyCode::Down | KeyCode::Char('j') => {
			app.timeline_index = app.timeline_index.saturating_add(1);
		}
		KeyCode::Char('a') => {
			if session.itinerary.toggle_bulk(trip) {
				app.status = if session.itinerary.bulk().expand() {
					"Expanded all visits".to_string()
				} else {
					"Collapsed all visits".to_string()
				};
			} else {
				app.status = "No visits on this day".to_string();
			}
		}
		KeyCode::Enter => match selected_visit_id(app, session) {
			Some(id) => {
				session.itinerary.toggle_card(&id);
			}
			None => app.status = "Select a visit to expand".to_string(),
		},
		KeyCode::Char(' ') => {
			let Some(id) = selected_visit_id(app, session) else {
				app.status = "Select a visit to mark".to_string();
				return;
			};
			let result = session.itinerary.toggle_completion(&id, Instant::now());
			let completed = session.itinerary.completion().is_completed(&id);
			if completed {
				app.celebration = Some(
					CELEBRATION_CAPTIONS
						.choose(&mut thread_rng())
						.map(|caption| caption.to_string())
						.unwrap_or_default(),
				);
			}
			let name = session.trip.visit(&id).map(|visit| visit.name.as_str()).unwrap_or("visit");
			app.status = match result {
				Ok(true) => format!("Visited {name}"),
				Ok(false) => format!("Unmarked {name}"),
				Err(err) => format!("error: could not save progress: {err}"),
			};
		}
		_ => {}
	}
}

fn selected_visit_id<S: CompletionStore>(app: &App, session: &Session<'_, S>) -> Option<String> {
	session
		.itinerary
		.current_day(session.trip)
		.and_then(|day| day.items.get(app.timeline_index))
		.and_then(TimelineEntry::as_visit)
		.map(|visit| visit.id.clone())
}

fn handle_ledger_key<S: CompletionStore>(app: &mut App, code: KeyCode, session: &mut Session<'_, S>) {
	let ledger = &mut session.ledger;
	match code {
		KeyCode::Up | KeyCode::Char('k') => {
			app.expense_index = app.expense_index.saturating_sub(1);
		}
		KeyCode::Down | KeyCode::Char('j') => {
			app.expense_index = app.expense_index.saturating_add(1);
		}
		KeyCode::Char('n' | 'e' | 'x' | 'd') if ledger.is_submitting() => {
			app.status = "Still saving the previous change".to_string();
		}
		KeyCode::Char('n') => {
			if ledger.editing_id().is_some() {
				if let Err(err) = ledger.cancel_edit() {
					app.status = format!("error: {err}");
					return;
				}
			}
			if ledger.form.purchase_date.is_empty() {
				if let Some(day) = session.itinerary.current_day(session.trip) {
					ledger.form.purchase_date = day.date.format("%Y-%m-%d").to_string();
				}
			}
			app.mode = InputMode::Prompt(date_prompt(ledger));
		}
		KeyCode::Char('e') => {
			let Some(id) = selected_expense_id(app, ledger) else {
				app.status = "No expense selected".to_string();
				return;
			};
			match ledger.begin_edit(&id) {
				Ok(true) => app.mode = InputMode::Prompt(date_prompt(ledger)),
				Ok(false) => app.status = "Expense is no longer listed".to_string(),
				Err(err) => app.status = format!("error: {err}"),
			}
		}
		KeyCode::Char('x') => {
			let result = if ledger.editing_id().is_some() {
				ledger.cancel_edit().map(|()| "Edit cancelled")
			} else {
				ledger.clear_form().map(|()| "Form cleared")
			};
			app.status = match result {
				Ok(message) => message.to_string(),
				Err(err) => format!("error: {err}"),
			};
		}
		KeyCode::Char('d') => {
			let Some(id) = selected_expense_id(app, ledger) else {
				app.status = "No expense selected".to_string();
				return;
			};
			let name = ledger
				.record(&id)
				.map(|record| record.product_name.clone())
				.unwrap_or_default();
			match ledger.request_delete(&id) {
				Ok(true) => app.mode = InputMode::Select(build_delete_confirm_select(&name)),
				Ok(false) => app.status = "Expense is no longer listed".to_string(),
				Err(err) => app.status = format!("error: {err}"),
			}
		}
		KeyCode::Char('c') => {
			let currency = ledger.cycle_currency();
			app.status = format!("Showing amounts in {}", currency.label());
		}
		KeyCode::Char('f') => {
			app.mode = InputMode::Select(build_filter_select(ledger, session.trip));
		}
		KeyCode::Esc => {
			ledger.dismiss_banner();
		}
		_ => {}
	}
}

fn purchase_date_label(trip: &Trip, date: NaiveDate) -> String {
	match trip.day_for_date(date) {
		Some(day) => day.title.clone(),
		None => date.format("%Y-%m-%d").to_string(),
	}
}

fn selected_expense_id(app: &App, ledger: &ExpenseLedger) -> Option<String> {
	ledger
		.visible_records()
		.get(app.expense_index)
		.map(|record| record.id.clone())
}

fn handle_prompt_key<S: CompletionStore>(app: &mut App, code: KeyCode, session: &mut Session<'_, S>) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Input cancelled".to_string();
		}
		KeyCode::Backspace => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.pop();
			}
		}
		KeyCode::Char(value) => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.push(value);
			}
		}
		KeyCode::Enter => {
			let prompt = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Prompt(prompt) => prompt,
				InputMode::Normal | InputMode::Select(_) => return false,
			};

			match submit_prompt(prompt, session) {
				PromptOutcome::NextPrompt(next_prompt) => app.mode = InputMode::Prompt(next_prompt),
				PromptOutcome::Select(select) => app.mode = InputMode::Select(select),
				PromptOutcome::Done(message) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
			}
		}
		_ => {}
	}

	false
}

fn handle_select_key<S: CompletionStore>(app: &mut App, code: KeyCode, session: &mut Session<'_, S>) -> bool {
	match code {
		KeyCode::Esc => {
			if let InputMode::Select(SelectState {
				kind: SelectKind::DeleteConfirm,
				..
			}) = &app.mode
			{
				session.ledger.cancel_delete();
			}
			app.mode = InputMode::Normal;
			app.status = "Selection cancelled".to_string();
		}
		KeyCode::Up | KeyCode::Char('k') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(-1);
			}
		}
		KeyCode::Down | KeyCode::Char('j') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(1);
			}
		}
		KeyCode::Enter => {
			let select = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Select(select) => select,
				_ => return false,
			};

			match submit_select(select.clone(), session) {
				Ok(SelectOutcome::NextPrompt(prompt)) => app.mode = InputMode::Prompt(prompt),
				Ok(SelectOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					app.mode = InputMode::Select(select);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn submit_prompt<S: CompletionStore>(prompt: PromptState, session: &mut Session<'_, S>) -> PromptOutcome {
	let ledger = &mut session.ledger;
	let input = prompt.input.trim().to_string();
	match prompt.kind {
		PromptKind::ExpenseDate => {
			ledger.form.purchase_date = input;
			PromptOutcome::NextPrompt(
				PromptState::new("Item name", PromptKind::ExpenseName).with_input(&ledger.form.product_name),
			)
		}
		PromptKind::ExpenseName => {
			ledger.form.product_name = input;
			PromptOutcome::Select(build_category_select(&ledger.form.category))
		}
		PromptKind::ExpensePrice => {
			ledger.form.price = input;
			PromptOutcome::Done(submit_expense(ledger, &mut session.tasks))
		}
	}
}

fn submit_select<S: CompletionStore>(select: SelectState, session: &mut Session<'_, S>) -> Result<SelectOutcome, String> {
	let selected_value = select
		.selected_option()
		.map(|option| option.value.clone())
		.ok_or_else(|| "no option selected".to_string())?;
	let ledger = &mut session.ledger;

	match select.kind {
		SelectKind::ExpenseCategory => {
			ledger.form.category = selected_value.ok_or_else(|| "selected category is missing".to_string())?;
			Ok(SelectOutcome::NextPrompt(
				PromptState::new(format!("Price ({})", BASE_CURRENCY.code()), PromptKind::ExpensePrice)
					.with_input(&ledger.form.price),
			))
		}
		SelectKind::DeleteConfirm => {
			if selected_value.as_deref() != Some("delete") {
				ledger.cancel_delete();
				return Ok(SelectOutcome::Done("Delete cancelled".to_string()));
			}
			match ledger.prepare_delete() {
				Ok(mutation) => {
					session.tasks.spawn_mutation(mutation);
					Ok(SelectOutcome::Done("Deleting…".to_string()))
				}
				Err(err) => Ok(SelectOutcome::Done(format!("error: {err}"))),
			}
		}
		SelectKind::FilterDate => {
			let date = selected_value
				.map(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|err| err.to_string()))
				.transpose()?;
			ledger.set_filter(date);
			filter_message(date)
		}
	}
}

fn filter_message(date: Option<NaiveDate>) -> Result<SelectOutcome, String> {
	Ok(SelectOutcome::Done(match date {
		Some(date) => format!("Showing expenses on {}", date.format("%Y-%m-%d")),
		None => "Showing all expenses".to_string(),
	}))
}

fn submit_expense(ledger: &mut ExpenseLedger, tasks: &mut TaskRunner) -> String {
	match ledger.prepare_submit() {
		Ok(mutation) => {
			tasks.spawn_mutation(mutation);
			"Saving…".to_string()
		}
		Err(err) => {
			warn!(error = %err, "expense not submitted");
			format!("error: {err}")
		}
	}
}

fn date_prompt(ledger: &ExpenseLedger) -> PromptState {
	PromptState::new("Purchase date (YYYY-MM-DD)", PromptKind::ExpenseDate).with_input(&ledger.form.purchase_date)
}

fn build_category_select(current: &str) -> SelectState {
	let options = EXPENSE_CATEGORIES
		.iter()
		.map(|category| {
			SelectOption::new(
				format!("{} {}", category.emoji, category.label),
				Some(category.id.to_string()),
				Style::default(),
			)
		})
		.collect::<Vec<_>>();
	let mut select = SelectState::new("Category", SelectKind::ExpenseCategory, options);
	if let Some(index) = EXPENSE_CATEGORIES.iter().position(|category| category.id == current) {
		select.selected = index;
	}
	select
}

fn build_delete_confirm_select(name: &str) -> SelectState {
	SelectState::new(
		format!("Delete {name}?"),
		SelectKind::DeleteConfirm,
		vec![
			SelectOption::new("Keep it", Some("keep".to_string()), Style::default()),
			SelectOption::new("Delete", Some("delete".to_string()), Style::default().fg(ERROR_COLOR)),
		],
	)
}

/// Trip days first, then any other dates that have expenses.
fn build_filter_select(ledger: &ExpenseLedger, trip: &Trip) -> SelectState {
	let mut dates = trip.dates();
	for date in ledger.expense_dates() {
		if !dates.contains(&date) {
			dates.push(date);
		}
	}

	let mut options = vec![SelectOption::new("All dates", None, Style::default())];
	options.extend(dates.into_iter().map(|date| {
		let label = match trip.day_for_date(date) {
			Some(day) => format!("{} {} {}", date.format("%Y-%m-%d"), day.weekday, day.title),
			None => date.format("%Y-%m-%d").to_string(),
		};
		SelectOption::new(label, Some(date.format("%Y-%m-%d").to_string()), Style::default())
	}));

	let mut select = SelectState::new("Filter by date", SelectKind::FilterDate, options);
	if let Some(current) = ledger.filter_date() {
		let value = current.format("%Y-%m-%d").to_string();
		if let Some(index) = select
			.options
			.iter()
			.position(|option| option.value.as_deref() == Some(value.as_str()))
		{
			select.selected = index;
		}
	}
	select
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

#[derive(Debug, Clone)]
enum PromptOutcome {
	NextPrompt(PromptState),
	Select(SelectState),
	Done(String),
}

#[derive(Debug, Clone)]
enum SelectOutcome {
	NextPrompt(PromptState),
	Done(String),
}

#[derive(Debug, Clone)]
struct PromptState {
	title: String,
	input: String,
	kind: PromptKind,
}

impl PromptState {
	fn new(title: impl Into<String>, kind: PromptKind) -> Self {
		Self {
			title: title.into(),
			input: String::new(),
			kind,
		}
	}

	fn with_input(mut self, input: &str) -> Self {
		self.input = input.to_string();
		self
	}
}

#[derive(Debug, Clone)]
struct SelectState {
	title: String,
	options: Vec<SelectOption>,
	selected: usize,
	kind: SelectKind,
}

impl SelectState {
	fn new(title: impl Into<String>, kind: SelectKind, options: Vec<SelectOption>) -> Self {
		Self {
			title: title.into(),
			options,
			selected: 0,
			kind,
		}
	}

	fn move_selection(&mut self, delta: i32) {
		if self.options.is_empty() {
			self.selected = 0;
			return;
		}

		if delta > 0 {
			self.selected = (self.selected + delta as usize).min(self.options.len() - 1);
		} else {
			self.selected = self.selected.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	fn selected_option(&self) -> Option<&SelectOption> {
		self.options.get(self.selected)
	}
}

#[derive(Debug, Clone)]
struct SelectOption {
	label: String,
	value: Option<String>,
	style: Style,
}

impl SelectOption {
	fn new(label: impl Into<String>, value: Option<String>, style: Style) -> Self {
		Self {
			label: label.into(),
			value,
			style,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
	ExpenseDate,
	ExpenseName,
	ExpensePrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectKind {
	ExpenseCategory,
	DeleteConfirm,
	FilterDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MainTab {
	Itinerary,
	Ledger,
}

impl MainTab {
	fn next(self) -> Self {
		match self {
			MainTab::Itinerary => MainTab::Ledger,
			MainTab::Ledger => MainTab::Itinerary,
		}
	}

	fn index(self) -> usize {
		match self {
			MainTab::Itinerary => 0,
			MainTab::Ledger => 1,
		}
	}

	fn label(self) -> &'static str {
		match self {
			MainTab::Itinerary => "Itinerary",
			MainTab::Ledger => "Expenses",
		}
	}
}

#[derive(Debug, Clone)]
enum InputMode {
	Normal,
	Prompt(PromptState),
	Select(SelectState),
}

#[derive(Debug, Clone)]
struct App {
	tab: MainTab,
	timeline_index: usize,
	expense_index: usize,
	celebration: Option<String>,
	mode: InputMode,
	status: String,
}

impl Default for App {
	fn default() -> Self {
		Self {
			tab: MainTab::Itinerary,
			timeline_index: 0,
			expense_index: 0,
			celebration: None,
			mode: InputMode::Normal,
			status: "Ready".to_string(),
		}
	}
}

impl App {
	fn clamp_selection<S: CompletionStore>(&mut self, session: &Session<'_, S>) {
		let timeline_len = session
			.itinerary
			.current_day(session.trip)
			.map(|day| day.items.len())
			.unwrap_or(0);
		self.timeline_index = self.timeline_index.min(timeline_len.saturating_sub(1));

		let expense_len = session.ledger.visible_records().len();
		self.expense_index = self.expense_index.min(expense_len.saturating_sub(1));
	}

	/// Caption to show while any card on the current day is celebrating.
	fn active_celebration<S: CompletionStore>(&self, session: &Session<'_, S>) -> Option<&str> {
		let day = session.itinerary.current_day(session.trip)?;
		let celebrating = day_celebrating(day, session.itinerary);
		if celebrating {
			self.celebration.as_deref()
		} else {
			None
		}
	}
}

fn day_celebrating<S: CompletionStore>(day: &DayPlan, itinerary: &Itinerary<S>) -> bool {
	day.visits()
		.filter_map(|visit| itinerary.card(&visit.id))
		.any(|card| card.celebrating())
}
