//! Data models for scraped rows and the published substitution document.
//!
//! Two shapes flow through a run:
//! - the **raw scrape** ([`RawScrape`]): day label → ordered [`RawRow`]s, exactly as the
//!   cells appeared in the source table. This is what the change detector snapshots.
//! - the **canonical document** ([`FormattedDocument`]): the normalized, schema-checked
//!   artifact consumed by readers.
//!
//! The canonical document uses camelCase keys (`createdAt`, `weekDay`) because that is
//! the published file format.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// One table row's cell texts in column order, trimmed, with no cell dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RawRow(pub Vec<String>);

impl RawRow {
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Cell text at `index`, empty if the row is shorter.
    pub fn cell(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }
}

impl<S: Into<String>> FromIterator<S> for RawRow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RawRow(iter.into_iter().map(Into::into).collect())
    }
}

/// Raw rows of the target class for every day, in day-index order.
///
/// Equality is order-sensitive: two scrapes are equal only when they list the same
/// days in the same order with identical rows.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RawScrape(pub IndexMap<String, Vec<RawRow>>);

impl RawScrape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, rows: Vec<RawRow>) {
        self.0.insert(label.into(), rows);
    }

    pub fn days(&self) -> impl Iterator<Item = (&String, &Vec<RawRow>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of rows over all days.
    pub fn row_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl PartialEq for RawScrape {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().eq(other.0.iter())
    }
}

impl Eq for RawScrape {}

/// One weekday's page on the source site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayIndexEntry {
    /// `<weekday>_<date>`, unique within a run.
    pub label: String,
    pub weekday: String,
    pub date: String,
    pub url: Url,
}

/// Result of scanning one day's table for the target class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Anchor rows and their continuation rows, concatenated in encounter order.
    pub rows: Vec<RawRow>,
    /// Whether any row's first cell matched the class id.
    pub found: bool,
}

impl Extraction {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One normalized substitution line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContentItem {
    pub position: String,
    pub teacher: String,
    pub subject: String,
    pub room: String,
    pub topic: String,
    pub info: String,
}

/// ISO weekday number (Monday = 1, 0 when unknown) plus the name as scraped.
///
/// Serialized as a two-element string array: `["1", "Montag"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(into = "(String, String)", try_from = "(String, String)")]
pub struct WeekDay {
    pub iso: u8,
    pub name: String,
}

impl WeekDay {
    /// Weekday names as they appear on the source site, Monday first.
    pub const NAMES: [&'static str; 7] = [
        "Montag",
        "Dienstag",
        "Mittwoch",
        "Donnerstag",
        "Freitag",
        "Samstag",
        "Sonntag",
    ];

    /// Look up the ISO number of `name`; unknown names map to 0 and are kept verbatim.
    pub fn from_name(name: &str) -> Self {
        let iso = Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| i as u8 + 1)
            .unwrap_or(0);
        WeekDay {
            iso,
            name: name.to_string(),
        }
    }

    /// First weekday name contained in `text`.
    pub fn find_in(text: &str) -> Option<&'static str> {
        Self::NAMES.iter().copied().find(|n| text.contains(n))
    }
}

impl From<WeekDay> for (String, String) {
    fn from(day: WeekDay) -> Self {
        (day.iso.to_string(), day.name)
    }
}

impl TryFrom<(String, String)> for WeekDay {
    type Error = std::num::ParseIntError;

    fn try_from((iso, name): (String, String)) -> Result<Self, Self::Error> {
        Ok(WeekDay {
            iso: iso.parse()?,
            name,
        })
    }
}

/// All substitutions of one day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubstitutionEntry {
    pub id: String,
    pub date: String,
    #[serde(rename = "weekDay")]
    pub week_day: WeekDay,
    pub content: Vec<ContentItem>,
}

/// The published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FormattedDocument {
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "class")]
    pub course: String,
    pub substitution: Vec<SubstitutionEntry>,
}

impl FormattedDocument {
    /// Number of content items over all days.
    pub fn item_count(&self) -> usize {
        self.substitution.iter().map(|s| s.content.len()).sum()
    }
}
