mod config;
mod currency;
mod expenses;
mod logging;
mod remote;
mod schedule;
mod storage;
mod tasks;
mod trip;
mod ui;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{CliOverrides, Config};
use crate::currency::{BASE_CURRENCY, Currency, format_amount};
use crate::expenses::{ExpenseDraft, ExpenseLedger, category_info};
use crate::logging::init_logging;
use crate::remote::{LedgerStore, OpenErApiRates, RateSource, RestLedgerStore, UnconfiguredStore};
use crate::schedule::{CompletionTracker, DaySelection, Itinerary};
use crate::storage::{CompletionStore, FileCompletionStore};
use crate::tasks::TaskRunner;
use crate::trip::{DayPlan, TimelineEntry, Trip};
use crate::ui::run_dashboard;

#[derive(Debug, Parser)]
#[command(name = "trip-ledger", about = "Terminal-first trip itinerary and expense ledger")]
struct Cli {
	/// Trip file (TOML); the bundled sample trip is used when absent.
	#[arg(long, global = true)]
	trip: Option<PathBuf>,
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// Log at debug level unless TRIP_LEDGER_LOG says otherwise.
	#[arg(long, short, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Dashboard,
	Days,
	Day {
		#[arg(long, allow_negative_numbers = true)]
		index: i64,
	},
	Toggle {
		#[arg(long)]
		id: String,
	},
	Expenses {
		#[arg(long)]
		date: Option<NaiveDate>,
		#[arg(long)]
		currency: Option<Currency>,
	},
	AddExpense {
		#[arg(long)]
		date: String,
		#[arg(long)]
		name: String,
		#[arg(long)]
		category: String,
		#[arg(long)]
		price: String,
	},
	EditExpense {
		#[arg(long)]
		id: String,
		#[arg(long)]
		date: String,
		#[arg(long)]
		name: String,
		#[arg(long)]
		category: String,
		#[arg(long)]
		price: String,
	},
	DeleteExpense {
		#[arg(long)]
		id: String,
	},
	Rates,
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let config = Config::resolve(&CliOverrides {
		config: cli.config.clone(),
		trip: cli.trip.clone(),
	})?;

	match init_logging(&config.state_dir, cli.verbose) {
		Ok(path) => info!(log = %path.display(), "logging initialized"),
		Err(err) => eprintln!("warning: logging disabled: {err}"),
	}

	let trip = match &config.trip {
		Some(path) => Trip::load(path)?,
		None => Trip::sample()?,
	};
	let completion_store = FileCompletionStore::in_dir(&config.state_dir);

	match cli.command.unwrap_or(Command::Dashboard) {
		Command::Dashboard => {
			let tracker = CompletionTracker::hydrate(completion_store)?;
			let mut itinerary = Itinerary::new(tracker);
			let tasks = TaskRunner::new(ledger_store(&config)?, rate_source(&config)?);
			run_dashboard(&trip, &mut itinerary, tasks)?;
		}
		Command::Days => {
			print_days(&trip, &completion_store)?;
		}
		Command::Day { index } => {
			let tracker = CompletionTracker::hydrate(completion_store)?;
			let mut selection = DaySelection::default();
			selection.select(index);
			match selection.current_day(&trip.days) {
				Some(day) => print_day(day, &tracker),
				None => println!("no days planned"),
			}
		}
		Command::Toggle { id } => {
			let visit = trip
				.visit(&id)
				.ok_or_else(|| format!("no visit with id '{id}' in this trip"))?;
			let mut tracker = CompletionTracker::hydrate(completion_store)?;
			let completed = tracker.toggle(&id)?;
			let state = if completed { "visited" } else { "not visited" };
			println!("{} is now {state}", visit.name);
		}
		Command::Expenses { date, currency } => {
			let store = ledger_store(&config)?;
			let mut ledger = ExpenseLedger::new();
			ledger.load(store.as_ref())?;
			ledger.set_filter(date);
			if let Some(currency) = currency {
				ledger.set_currency(currency);
				if currency != BASE_CURRENCY {
					let rates = rate_source(&config)?;
					if let Err(err) = ledger.apply_rates(rates.latest()) {
						eprintln!("warning: {err}; showing {BASE_CURRENCY} amounts");
					}
				}
			}
			print_expenses(&ledger);
		}
		Command::AddExpense {
			date,
			name,
			category,
			price,
		} => {
			let store = ledger_store(&config)?;
			let mut ledger = ExpenseLedger::new();
			let draft = ExpenseDraft {
				purchase_date: date,
				product_name: name,
				category,
				price,
			};
			let record = ledger.create(store.as_ref(), draft)?;
			println!("added expense {} ({})", record.id, record.product_name);
		}
		Command::EditExpense {
			id,
			date,
			name,
			category,
			price,
		} => {
			let store = ledger_store(&config)?;
			let mut ledger = ExpenseLedger::new();
			ledger.load(store.as_ref())?;
			let draft = ExpenseDraft {
				purchase_date: date,
				product_name: name,
				category,
				price,
			};
			let record = ledger.update(store.as_ref(), &id, draft)?;
			println!("updated expense {} ({})", record.id, record.product_name);
		}
		Command::DeleteExpense { id } => {
			let store = ledger_store(&config)?;
			let mut ledger = ExpenseLedger::new();
			ledger.delete(store.as_ref(), &id)?;
			println!("deleted expense {id}");
		}
		Command::Rates => {
			let rates = rate_source(&config)?.latest()?;
			for currency in Currency::ALL {
				println!(
					"{} 1,000 = {}",
					BASE_CURRENCY.code(),
					format_amount(1_000, currency, Some(&rates))
				);
			}
		}
	}

	Ok(())
}

fn ledger_store(config: &Config) -> Result<Arc<dyn LedgerStore>, Box<dyn Error>> {
	match config.store() {
		Some(store) => Ok(Arc::new(RestLedgerStore::new(store)?)),
		None => {
			warn!("no expense store configured");
			Ok(Arc::new(UnconfiguredStore))
		}
	}
}

fn rate_source(config: &Config) -> Result<Arc<dyn RateSource>, Box<dyn Error>> {
	Ok(Arc::new(OpenErApiRates::new(config.rates_url.clone())?))
}

fn print_days<S: CompletionStore>(trip: &Trip, store: &S) -> Result<(), Box<dyn Error>> {
	if trip.is_empty() {
		println!("no days planned");
		return Ok(());
	}

	let completed = store.load()?;
	for (index, day) in trip.days.iter().enumerate() {
		let total = day.visits().count();
		let done = day
			.visits()
			.filter(|visit| completed.get(&visit.id).copied().unwrap_or(false))
			.count();
		println!(
			"{:>2}. {} {} | {} | {done}/{total} visited",
			index + 1,
			day.date.format("%Y-%m-%d"),
			day.weekday,
			day.title
		);
	}

	Ok(())
}

fn print_day<S: CompletionStore>(day: &DayPlan, tracker: &CompletionTracker<S>) {
	println!("{} {} | {}", day.date.format("%Y-%m-%d"), day.weekday, day.title);
	if day.items.is_empty() {
		println!("nothing planned");
		return;
	}

	for entry in &day.items {
		match entry {
			TimelineEntry::Visit(visit) => {
				let marker = if tracker.is_completed(&visit.id) { "x" } else { " " };
				println!(
					"{} [{marker}] {} {} ({}) #{}",
					visit.time,
					visit.emoji,
					visit.name,
					visit.category.label(),
					visit.id
				);
				if let Some(note) = &visit.note {
					println!("          {note}");
				}
			}
			TimelineEntry::Transit(transit) => {
				println!("        ↓ {} {}", transit.icon, transit.duration);
			}
			TimelineEntry::Reminder(reminder) => {
				println!("{} (!) {} {}", reminder.time, reminder.emoji, reminder.name);
				if let Some(note) = &reminder.note {
					println!("          {note}");
				}
			}
		}
	}
}

fn print_expenses(ledger: &ExpenseLedger) {
	let rows = ledger.visible_records();
	if rows.is_empty() {
		println!("no expenses");
	}

	for record in &rows {
		let category = category_info(&record.category)
			.map(|category| format!("{} {}", category.emoji, category.label))
			.unwrap_or_else(|| record.category.clone());
		println!(
			"{} | {} | {} | {} | {}",
			record.id,
			record.purchase_date.format("%Y-%m-%d"),
			category,
			record.product_name,
			ledger.display_amount(record.price)
		);
	}

	println!("\ntotal: {}", ledger.display_amount(ledger.total()));
	for (category, total) in ledger.category_totals() {
		println!("{} {} | {}", category.emoji, category.label, ledger.display_amount(total));
	}
	if let Some(note) = ledger.rates_note() {
		println!("({note})");
	}
}
