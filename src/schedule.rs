use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::warn;

use crate::storage::{CompletionMap, CompletionStore, StorageError};
use crate::trip::{DayPlan, Trip};

pub const CELEBRATION_DURATION: Duration = Duration::from_millis(1500);
pub const COLLAPSE_DELAY: Duration = Duration::from_millis(600);

/// Selected day, stored unclamped and clamped on every read so a longer
/// day collection can bring an out-of-range request back into view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySelection {
    requested: i64,
}

impl DaySelection {
    pub fn select(&mut self, index: i64) {
        self.requested = index;
    }

    pub fn current_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let last = i64::try_from(len - 1).unwrap_or(i64::MAX);
        self.requested.clamp(0, last) as usize
    }

    pub fn current_day<'a>(&self, days: &'a [DayPlan]) -> Option<&'a DayPlan> {
        days.get(self.current_index(days.len()))
    }

    pub fn step(&mut self, delta: i64, len: usize) {
        let current = self.current_index(len) as i64;
        self.requested = current.saturating_add(delta);
    }
}

pub struct CompletionTracker<S> {
    map: CompletionMap,
    store: S,
}

impl<S: CompletionStore> CompletionTracker<S> {
    pub fn hydrate(store: S) -> Result<Self, StorageError> {
        let map = store.load()?;
        Ok(Self { map, store })
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.map.get(id).copied().unwrap_or(false)
    }

    /// Flips one entry and writes the whole map back. The in-memory flip
    /// stands even when the write fails.
    pub fn toggle(&mut self, id: &str) -> Result<bool, StorageError> {
        let next = !self.is_completed(id);
        self.map.insert(id.to_string(), next);
        self.store.save(&self.map)?;
        Ok(next)
    }

    pub fn completed_count<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        ids.into_iter().filter(|id| self.is_completed(id)).count()
    }
}

/// Broadcast value observed by every visit card on the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkBroadcast {
    pub expand: bool,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkToggle {
    expand: bool,
    generation: u64,
}

impl Default for BulkToggle {
    fn default() -> Self {
        Self {
            expand: true,
            generation: 0,
        }
    }
}

impl BulkToggle {
    pub fn reset(&mut self) {
        self.expand = true;
        self.generation += 1;
    }

    pub fn toggle(&mut self) {
        self.expand = !self.expand;
        self.generation += 1;
    }

    pub fn expand(&self) -> bool {
        self.expand
    }

    pub fn broadcast(&self) -> BulkBroadcast {
        BulkBroadcast {
            expand: self.expand,
            generation: self.generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitCard {
    expanded: bool,
    seen_completed: bool,
    seen_generation: Option<u64>,
    celebrate_until: Option<Instant>,
    collapse_at: Option<Instant>,
}

impl VisitCard {
    pub fn mount(completed: bool) -> Self {
        Self {
            expanded: !completed,
            seen_completed: completed,
            seen_generation: None,
            celebrate_until: None,
            collapse_at: None,
        }
    }

    pub fn expanded(&self) -> bool {
        self.expanded
    }

    pub fn celebrating(&self) -> bool {
        self.celebrate_until.is_some()
    }

    #[cfg(test)]
    pub fn has_pending_timers(&self) -> bool {
        self.celebrate_until.is_some() || self.collapse_at.is_some()
    }

    /// Applies whatever changed since the last call: a completion flip
    /// resets the card to its default, a new bulk generation overrides it.
    pub fn observe(&mut self, completed: bool, bulk: BulkBroadcast) {
        if completed != self.seen_completed {
            self.seen_completed = completed;
            self.expanded = !completed;
        }
        if self.seen_generation != Some(bulk.generation) {
            self.seen_generation = Some(bulk.generation);
            self.expanded = bulk.expand;
        }
    }

    /// Called right after the user flips completion on this card.
    pub fn completion_toggled(&mut self, completed: bool, now: Instant) {
        self.seen_completed = completed;
        if completed {
            self.celebrate_until = Some(now + CELEBRATION_DURATION);
            self.collapse_at = Some(now + COLLAPSE_DELAY);
        } else {
            self.celebrate_until = None;
            self.collapse_at = None;
            self.expanded = true;
        }
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }

    /// Fires due timers. Returns true when the card changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.collapse_at.is_some_and(|at| at <= now) {
            self.collapse_at = None;
            self.expanded = false;
            changed = true;
        }
        if self.celebrate_until.is_some_and(|until| until <= now) {
            self.celebrate_until = None;
            changed = true;
        }
        changed
    }

    pub fn teardown(&mut self) {
        self.celebrate_until = None;
        self.collapse_at = None;
    }
}

/// Everything the itinerary view needs: selection, completion, the bulk
/// broadcast and the cards mounted for the current day.
pub struct Itinerary<S> {
    selection: DaySelection,
    completion: CompletionTracker<S>,
    bulk: BulkToggle,
    cards: HashMap<String, VisitCard>,
    // `None` until the first sync; the date is `None` for an empty trip.
    mounted: Option<MountedDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MountedDay {
    index: usize,
    date: Option<NaiveDate>,
}

impl<S: CompletionStore> Itinerary<S> {
    pub fn new(completion: CompletionTracker<S>) -> Self {
        Self {
            selection: DaySelection::default(),
            completion,
            bulk: BulkToggle::default(),
            cards: HashMap::new(),
            mounted: None,
        }
    }

    pub fn bulk(&self) -> BulkToggle {
        self.bulk
    }

    pub fn completion(&self) -> &CompletionTracker<S> {
        &self.completion
    }

    pub fn current_day<'a>(&self, trip: &'a Trip) -> Option<&'a DayPlan> {
        self.selection.current_day(&trip.days)
    }

    pub fn current_index(&self, trip: &Trip) -> usize {
        self.selection.current_index(trip.len())
    }

    pub fn card(&self, id: &str) -> Option<&VisitCard> {
        self.cards.get(id)
    }

    pub fn select_day(&mut self, index: i64, trip: &Trip) {
        self.selection.select(index);
        self.sync(trip);
    }

    pub fn step_day(&mut self, delta: i64, trip: &Trip) {
        self.selection.step(delta, trip.len());
        self.sync(trip);
    }

    /// Remounts the cards whenever the current day changes, including the
    /// first call. The bulk broadcast resets only when the date changes, so
    /// two plans sharing a date keep the same broadcast.
    pub fn sync(&mut self, trip: &Trip) {
        let current = self.current_day(trip);
        let next = MountedDay {
            index: self.current_index(trip),
            date: current.map(|day| day.date),
        };
        if self.mounted == Some(next) {
            return;
        }

        for card in self.cards.values_mut() {
            card.teardown();
        }
        self.cards.clear();
        if self.mounted.map(|day| day.date) != Some(next.date) {
            self.bulk.reset();
        }
        self.mounted = Some(next);

        if let Some(day) = current {
            for visit in day.visits() {
                let card = VisitCard::mount(self.completion.is_completed(&visit.id));
                self.cards.insert(visit.id.clone(), card);
            }
        }
        self.observe_all();
    }

    pub fn toggle_bulk(&mut self, trip: &Trip) -> bool {
        let has_visits = self.current_day(trip).is_some_and(DayPlan::has_visits);
        if !has_visits {
            return false;
        }
        self.bulk.toggle();
        self.observe_all();
        true
    }

    pub fn toggle_card(&mut self, id: &str) -> bool {
        match self.cards.get_mut(id) {
            Some(card) => {
                card.toggle_expanded();
                true
            }
            None => false,
        }
    }

    /// Flips completion for a visit on the current day and drives the card's
    /// celebration and collapse timers.
    pub fn toggle_completion(&mut self, id: &str, now: Instant) -> Result<bool, StorageError> {
        let result = self.completion.toggle(id);
        let completed = self.completion.is_completed(id);
        if let Some(card) = self.cards.get_mut(id) {
            card.completion_toggled(completed, now);
        }
        if let Err(err) = &result {
            warn!(error = %err, visit = id, "failed to persist completion map");
        }
        result
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for card in self.cards.values_mut() {
            changed |= card.tick(now);
        }
        changed
    }

    pub fn teardown(&mut self) {
        for card in self.cards.values_mut() {
            card.teardown();
        }
    }

    fn observe_all(&mut self) {
        let broadcast = self.bulk.broadcast();
        for (id, card) in self.cards.iter_mut() {
            card.observe(self.completion.is_completed(id), broadcast);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use crate::storage::{CompletionMap, CompletionStore, StorageError};
    use crate::trip::Trip;

    use super::{
        BulkToggle, COLLAPSE_DELAY, CELEBRATION_DURATION, CompletionTracker, DaySelection,
        Itinerary, VisitCard,
    };

    #[derive(Clone, Default)]
    struct MemoryStore {
        saved: Rc<RefCell<Vec<CompletionMap>>>,
        initial: CompletionMap,
    }

    impl CompletionStore for MemoryStore {
        fn load(&self) -> Result<CompletionMap, StorageError> {
            Ok(self.initial.clone())
        }

        fn save(&self, map: &CompletionMap) -> Result<(), StorageError> {
            self.saved.borrow_mut().push(map.clone());
            Ok(())
        }
    }

    fn itinerary() -> (Itinerary<MemoryStore>, Trip) {
        let trip = Trip::sample().expect("sample trip");
        let tracker = CompletionTracker::hydrate(MemoryStore::default()).expect("hydrate");
        let mut itinerary = Itinerary::new(tracker);
        itinerary.sync(&trip);
        (itinerary, trip)
    }

    #[test]
    fn selection_reads_are_clamped() {
        let mut selection = DaySelection::default();
        for (written, len, expected) in [
            (-3, 5, 0),
            (0, 5, 0),
            (4, 5, 4),
            (9, 5, 4),
            (7, 0, 0),
            (i64::MAX, 2, 1),
            (i64::MIN, 2, 0),
        ] {
            selection.select(written);
            assert_eq!(selection.current_index(len), expected, "select({written}) len {len}");
        }
    }

    #[test]
    fn longer_collection_unclamps_previous_request() {
        let mut selection = DaySelection::default();
        selection.select(6);
        assert_eq!(selection.current_index(3), 2);
        assert_eq!(selection.current_index(10), 6);
        assert!(selection.current_day(&[]).is_none());
    }

    #[test]
    fn completion_toggle_is_an_involution_and_persists_each_time() {
        let store = MemoryStore::default();
        let saved = store.saved.clone();
        let mut tracker = CompletionTracker::hydrate(store).expect("hydrate");

        assert!(!tracker.is_completed("d1-ramen"));
        assert!(tracker.toggle("d1-ramen").expect("toggle"));
        assert!(!tracker.toggle("d1-ramen").expect("toggle"));
        assert!(!tracker.is_completed("d1-ramen"));

        let saved = saved.borrow();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].get("d1-ramen"), Some(&false));
    }

    #[test]
    fn hydrated_entries_are_respected() {
        let mut initial = CompletionMap::new();
        initial.insert("d1-hotel".to_string(), true);
        let tracker = CompletionTracker::hydrate(MemoryStore {
            initial,
            ..MemoryStore::default()
        })
        .expect("hydrate");
        assert!(tracker.is_completed("d1-hotel"));
        assert_eq!(tracker.completed_count(["d1-hotel", "d1-ramen"]), 1);
    }

    #[test]
    fn reset_always_expands_with_a_fresh_generation() {
        let mut bulk = BulkToggle::default();
        bulk.toggle();
        assert!(!bulk.expand());
        let before = bulk.broadcast().generation;
        bulk.reset();
        let first = bulk.broadcast();
        bulk.reset();
        let second = bulk.broadcast();
        assert!(first.expand && second.expand);
        assert!(first.generation > before);
        assert!(second.generation > first.generation);
    }

    #[test]
    fn bulk_broadcast_overrides_manual_collapse() {
        let (mut itinerary, trip) = itinerary();
        assert!(itinerary.card("d1-ramen").expect("card").expanded());

        itinerary.toggle_card("d1-ramen");
        assert!(!itinerary.card("d1-ramen").expect("card").expanded());

        itinerary.toggle_bulk(&trip);
        assert!(!itinerary.card("d1-hotel").expect("card").expanded());
        itinerary.toggle_bulk(&trip);
        assert!(itinerary.card("d1-ramen").expect("card").expanded());
        assert!(itinerary.card("d1-hotel").expect("card").expanded());

        itinerary.toggle_card("d1-hotel");
        assert!(!itinerary.card("d1-hotel").expect("card").expanded());
        assert!(itinerary.card("d1-ramen").expect("card").expanded());
        assert!(itinerary.bulk().expand());
    }

    #[test]
    fn changing_day_resets_bulk_and_expands_everything() {
        let (mut itinerary, trip) = itinerary();
        itinerary.toggle_bulk(&trip);
        assert!(!itinerary.bulk().expand());
        let generation = itinerary.bulk().broadcast().generation;

        itinerary.step_day(1, &trip);
        assert_eq!(itinerary.current_index(&trip), 1);
        assert!(itinerary.bulk().expand());
        assert!(itinerary.bulk().broadcast().generation > generation);
        assert!(itinerary.card("d2-castle").expect("card").expanded());
        assert!(itinerary.card("d1-ramen").is_none());

        let generation = itinerary.bulk().broadcast().generation;
        itinerary.select_day(1, &trip);
        assert_eq!(itinerary.bulk().broadcast().generation, generation);
    }

    #[test]
    fn completing_a_visit_celebrates_then_collapses() {
        let (mut itinerary, _trip) = itinerary();
        let start = Instant::now();

        assert!(itinerary.toggle_completion("d1-ramen", start).expect("toggle"));
        let card = itinerary.card("d1-ramen").expect("card");
        assert!(card.celebrating());
        assert!(card.expanded());

        itinerary.tick(start + COLLAPSE_DELAY);
        let card = itinerary.card("d1-ramen").expect("card");
        assert!(!card.expanded());
        assert!(card.celebrating());

        itinerary.tick(start + CELEBRATION_DURATION);
        assert!(!itinerary.card("d1-ramen").expect("card").celebrating());
    }

    #[test]
    fn uncompleting_reexpands_without_celebration() {
        let (mut itinerary, _trip) = itinerary();
        let start = Instant::now();
        itinerary.toggle_completion("d1-ramen", start).expect("toggle");
        itinerary.tick(start + CELEBRATION_DURATION);
        assert!(!itinerary.card("d1-ramen").expect("card").expanded());

        let later = start + Duration::from_secs(5);
        assert!(!itinerary.toggle_completion("d1-ramen", later).expect("toggle"));
        let card = itinerary.card("d1-ramen").expect("card");
        assert!(card.expanded());
        assert!(!card.celebrating());
    }

    #[test]
    fn rapid_toggles_replace_pending_timers() {
        let start = Instant::now();
        let mut card = VisitCard::mount(false);

        card.completion_toggled(true, start);
        card.completion_toggled(false, start + Duration::from_millis(100));
        assert!(!card.has_pending_timers());
        assert!(!card.tick(start + COLLAPSE_DELAY));
        assert!(card.expanded());

        let again = start + Duration::from_millis(200);
        card.completion_toggled(true, again);
        card.tick(start + COLLAPSE_DELAY);
        assert!(card.expanded(), "collapse must follow the latest trigger");
        card.tick(again + COLLAPSE_DELAY);
        assert!(!card.expanded());
        card.tick(again + CELEBRATION_DURATION);
        assert!(!card.celebrating());
    }

    #[test]
    fn teardown_clears_timers() {
        let mut card = VisitCard::mount(false);
        let start = Instant::now();
        card.completion_toggled(true, start);
        card.teardown();
        assert!(!card.has_pending_timers());
        assert!(!card.tick(start + CELEBRATION_DURATION));
        assert!(card.expanded());
    }

    #[test]
    fn plans_sharing_a_date_each_mount_their_own_cards() {
        let trip = Trip::from_toml_str(
            r#"
            [[days]]
            date = "2026-02-21"
            weekday = "Sat"
            title = "Morning plan"

            [[days.items]]
            type = "visit"
            id = "a"
            time = "09:00"
            name = "Fish market"
            category = "restaurant"
            emoji = "fish"

            [[days]]
            date = "2026-02-21"
            weekday = "Sat"
            title = "Evening plan"

            [[days.items]]
            type = "visit"
            id = "b"
            time = "19:00"
            name = "Night view"
            category = "attraction"
            emoji = "city"
            "#,
        )
        .expect("trip");
        let tracker = CompletionTracker::hydrate(MemoryStore::default()).expect("hydrate");
        let mut itinerary = Itinerary::new(tracker);
        itinerary.sync(&trip);
        let generation = itinerary.bulk().broadcast().generation;

        itinerary.step_day(1, &trip);
        assert_eq!(itinerary.current_index(&trip), 1);
        assert!(itinerary.card("a").is_none());
        assert!(itinerary.card("b").expect("card").expanded());
        assert_eq!(itinerary.bulk().broadcast().generation, generation);

        assert!(itinerary.toggle_card("b"));
        assert!(itinerary.toggle_card("b"));
        let start = Instant::now();
        itinerary.toggle_completion("b", start).expect("toggle");
        assert!(itinerary.card("b").expect("card").celebrating());
        itinerary.tick(start + COLLAPSE_DELAY);
        assert!(!itinerary.card("b").expect("card").expanded());
    }

    #[test]
    fn bulk_toggle_needs_visits() {
        let trip = Trip::from_toml_str(
            r#"
            [[days]]
            date = "2026-02-21"
            weekday = "Sat"
            title = "Travel day"

            [[days.items]]
            type = "transit"
            icon = "plane"
            duration = "3 h"
            "#,
        )
        .expect("trip");
        let tracker = CompletionTracker::hydrate(MemoryStore::default()).expect("hydrate");
        let mut itinerary = Itinerary::new(tracker);
        itinerary.sync(&trip);
        assert!(!itinerary.toggle_bulk(&trip));
        assert!(itinerary.bulk().expand());
    }
}
