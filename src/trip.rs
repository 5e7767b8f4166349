use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

const SAMPLE_TRIP: &str = include_str!("../data/sample_trip.toml");

#[derive(Debug)]
pub enum TripError {
    Io(std::io::Error),
    TomlDecode(toml::de::Error),
    MissingId { date: NaiveDate, index: usize },
    DuplicateId { date: NaiveDate, id: String },
}

impl Display for TripError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TripError::Io(err) => write!(f, "io error: {err}"),
            TripError::TomlDecode(err) => write!(f, "failed to parse trip file: {err}"),
            TripError::MissingId { date, index } => {
                write!(f, "entry #{index} on {date} needs an id")
            }
            TripError::DuplicateId { date, id } => {
                write!(f, "entry id '{id}' is used twice on {date}")
            }
        }
    }
}

impl std::error::Error for TripError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitCategory {
    Restaurant,
    Attraction,
    Shopping,
    Hotel,
}

impl VisitCategory {
    pub fn label(self) -> &'static str {
        match self {
            VisitCategory::Restaurant => "restaurant",
            VisitCategory::Attraction => "attraction",
            VisitCategory::Shopping => "shopping",
            VisitCategory::Hotel => "hotel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub id: String,
    pub time: String,
    pub name: String,
    pub category: VisitCategory,
    pub emoji: String,
    pub image: Option<String>,
    pub note: Option<String>,
    pub map_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transit {
    pub id: String,
    pub icon: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: String,
    pub time: String,
    pub name: String,
    pub emoji: String,
    pub note: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEntry {
    Visit(Visit),
    Transit(Transit),
    Reminder(Reminder),
}

impl TimelineEntry {
    pub fn id(&self) -> &str {
        match self {
            TimelineEntry::Visit(visit) => &visit.id,
            TimelineEntry::Transit(transit) => &transit.id,
            TimelineEntry::Reminder(reminder) => &reminder.id,
        }
    }

    pub fn as_visit(&self) -> Option<&Visit> {
        match self {
            TimelineEntry::Visit(visit) => Some(visit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub weekday: String,
    pub title: String,
    pub items: Vec<TimelineEntry>,
}

impl DayPlan {
    pub fn visits(&self) -> impl Iterator<Item = &Visit> {
        self.items.iter().filter_map(TimelineEntry::as_visit)
    }

    pub fn has_visits(&self) -> bool {
        self.visits().next().is_some()
    }
}

/// The fixed, ordered day collection of one trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trip {
    pub days: Vec<DayPlan>,
}

impl Trip {
    pub fn sample() -> Result<Self, TripError> {
        Self::from_toml_str(SAMPLE_TRIP)
    }

    pub fn load(path: &Path) -> Result<Self, TripError> {
        let raw = fs::read_to_string(path).map_err(TripError::Io)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, TripError> {
        let file: TripFile = toml::from_str(raw).map_err(TripError::TomlDecode)?;
        let days = file
            .days
            .into_iter()
            .map(RawDay::into_day_plan)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { days })
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days.iter().map(|day| day.date).collect()
    }

    pub fn day_for_date(&self, date: NaiveDate) -> Option<&DayPlan> {
        self.days.iter().find(|day| day.date == date)
    }

    pub fn visit(&self, id: &str) -> Option<&Visit> {
        self.days
            .iter()
            .flat_map(DayPlan::visits)
            .find(|visit| visit.id == id)
    }
}

#[derive(Debug, Deserialize)]
struct TripFile {
    #[serde(default)]
    days: Vec<RawDay>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    date: NaiveDate,
    weekday: String,
    title: String,
    #[serde(default)]
    items: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEntry {
    #[serde(alias = "spot")]
    Visit {
        #[serde(default)]
        id: Option<String>,
        time: String,
        name: String,
        category: VisitCategory,
        emoji: String,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        note: Option<String>,
        #[serde(default)]
        map_url: Option<String>,
    },
    Transit {
        #[serde(default)]
        id: Option<String>,
        icon: String,
        duration: String,
    },
    Reminder {
        #[serde(default)]
        id: Option<String>,
        time: String,
        name: String,
        emoji: String,
        #[serde(default)]
        note: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl RawDay {
    fn into_day_plan(self) -> Result<DayPlan, TripError> {
        let date = self.date;
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(self.items.len());

        for (index, raw) in self.items.into_iter().enumerate() {
            let entry = raw.into_entry(date, index)?;
            if !seen.insert(entry.id().to_string()) {
                return Err(TripError::DuplicateId {
                    date,
                    id: entry.id().to_string(),
                });
            }
            items.push(entry);
        }

        Ok(DayPlan {
            date,
            weekday: self.weekday,
            title: self.title,
            items,
        })
    }
}

impl RawEntry {
    fn into_entry(self, date: NaiveDate, index: usize) -> Result<TimelineEntry, TripError> {
        let required = |id: Option<String>| id.ok_or(TripError::MissingId { date, index });

        Ok(match self {
            RawEntry::Visit {
                id,
                time,
                name,
                category,
                emoji,
                image,
                note,
                map_url,
            } => TimelineEntry::Visit(Visit {
                id: required(id)?,
                time,
                name,
                category,
                emoji,
                image,
                note,
                map_url,
            }),
            // Transit chips are decorative; a positional key is stable enough.
            RawEntry::Transit { id, icon, duration } => TimelineEntry::Transit(Transit {
                id: id.unwrap_or_else(|| format!("{date}-{index}")),
                icon,
                duration,
            }),
            RawEntry::Reminder {
                id,
                time,
                name,
                emoji,
                note,
                url,
            } => TimelineEntry::Reminder(Reminder {
                id: required(id)?,
                time,
                name,
                emoji,
                note,
                url,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{TimelineEntry, Trip, TripError, VisitCategory};

    #[test]
    fn sample_trip_loads_with_ids() {
        let trip = Trip::sample().expect("sample trip should parse");
        assert_eq!(trip.len(), 3);
        let first = &trip.days[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 2, 21).unwrap());
        assert!(first.has_visits());
        assert_eq!(
            trip.visit("d1-ramen").map(|visit| visit.category),
            Some(VisitCategory::Restaurant)
        );
    }

    #[test]
    fn transit_without_id_gets_positional_key() {
        let trip = Trip::from_toml_str(
            r#"
            [[days]]
            date = "2026-02-21"
            weekday = "Sat"
            title = "Day 1"

            [[days.items]]
            type = "spot"
            id = "a"
            time = "09:00"
            name = "Shrine"
            category = "attraction"
            emoji = "⛩️"

            [[days.items]]
            type = "transit"
            icon = "walk"
            duration = "5 min"
            "#,
        )
        .expect("trip should parse");

        let items = &trip.days[0].items;
        assert!(matches!(items[0], TimelineEntry::Visit(_)));
        assert_eq!(items[1].id(), "2026-02-21-1");
    }

    #[test]
    fn rejects_duplicate_ids_within_a_day() {
        let result = Trip::from_toml_str(
            r#"
            [[days]]
            date = "2026-02-21"
            weekday = "Sat"
            title = "Day 1"

            [[days.items]]
            type = "reminder"
            id = "same"
            time = "09:00"
            name = "Tickets"
            emoji = "🎟️"

            [[days.items]]
            type = "reminder"
            id = "same"
            time = "10:00"
            name = "Lunch booking"
            emoji = "📞"
            "#,
        );

        assert!(matches!(result, Err(TripError::DuplicateId { .. })));
    }

    #[test]
    fn visits_must_carry_an_id() {
        let result = Trip::from_toml_str(
            r#"
            [[days]]
            date = "2026-02-21"
            weekday = "Sat"
            title = "Day 1"

            [[days.items]]
            type = "visit"
            time = "09:00"
            name = "Museum"
            category = "attraction"
            emoji = "🖼️"
            "#,
        );

        assert!(matches!(
            result,
            Err(TripError::MissingId { index: 0, .. })
        ));
    }
}
