//! Raw rows → canonical substitution document.
//!
//! Rows follow a fixed seven-column layout (see [`Column`]). Cells are never
//! filtered before they reach this module, so a row of the wrong width means
//! the source table changed shape; normalization refuses it instead of reading
//! shifted columns.
//!
//! Continuation rows usually leave the position cell empty. Such rows inherit
//! the last non-empty position seen earlier on the same day.

use crate::error::NormalizeError;
use crate::models::{ContentItem, FormattedDocument, RawRow, RawScrape, SubstitutionEntry, WeekDay};
use chrono::{DateTime, Local};
use tracing::{debug, instrument};

/// Column indices of the source table. Index 0 holds the class id.
#[derive(Debug, Clone, Copy)]
#[repr(usize)]
pub enum Column {
    Position = 1,
    Teacher,
    Subject,
    Room,
    Topic,
    Info,
}

/// Number of cells every raw row must have.
pub const COLUMN_COUNT: usize = Column::Info as usize + 1;

/// Format of `createdAt`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Builds [`FormattedDocument`]s for one class.
///
/// Entry ids count up across every day this normalizer has processed, starting
/// at `"1"`; construct a fresh normalizer to restart numbering.
#[derive(Debug)]
pub struct EntryNormalizer {
    course: String,
    issued: usize,
}

impl EntryNormalizer {
    pub fn new(course: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            issued: 0,
        }
    }

    /// Normalize `scrape`, stamping the document with the current local time.
    pub fn normalize(&mut self, scrape: &RawScrape) -> Result<FormattedDocument, NormalizeError> {
        self.normalize_at(scrape, Local::now())
    }

    /// Normalize `scrape` with an explicit creation time.
    ///
    /// Days keep the scrape's order. Every row is width-checked before any
    /// entry is built, so an error leaves the id counter untouched.
    #[instrument(level = "info", skip_all, fields(course = %self.course, days = scrape.len()))]
    pub fn normalize_at(
        &mut self,
        scrape: &RawScrape,
        created_at: DateTime<Local>,
    ) -> Result<FormattedDocument, NormalizeError> {
        for (label, rows) in scrape.days() {
            check_widths(label, rows)?;
        }

        let substitution = scrape
            .days()
            .map(|(label, rows)| self.entry(label, rows))
            .collect::<Vec<_>>();

        let document = FormattedDocument {
            created_at: created_at.format(CREATED_AT_FORMAT).to_string(),
            course: self.course.clone(),
            substitution,
        };
        debug!(items = document.item_count(), "Normalized document");
        Ok(document)
    }

    fn entry(&mut self, label: &str, rows: &[RawRow]) -> SubstitutionEntry {
        self.issued += 1;
        let (weekday, date) = split_label(label);

        SubstitutionEntry {
            id: self.issued.to_string(),
            date: date.to_string(),
            week_day: WeekDay::from_name(weekday),
            content: content_items(rows),
        }
    }
}

/// Split `Montag_02.09.2024` into weekday name and date.
///
/// A label without `_` is taken as a bare weekday name with an empty date.
pub fn split_label(label: &str) -> (&str, &str) {
    label.split_once('_').unwrap_or((label, ""))
}

/// Map rows to content items, carrying empty positions forward.
pub fn content_items(rows: &[RawRow]) -> Vec<ContentItem> {
    let mut carried = String::new();

    rows.iter()
        .map(|row| {
            let position = row.cell(Column::Position as usize);
            if !position.is_empty() {
                carried = position.to_string();
            }
            ContentItem {
                position: carried.clone(),
                teacher: row.cell(Column::Teacher as usize).to_string(),
                subject: row.cell(Column::Subject as usize).to_string(),
                room: row.cell(Column::Room as usize).to_string(),
                topic: row.cell(Column::Topic as usize).to_string(),
                info: row.cell(Column::Info as usize).to_string(),
            }
        })
        .collect()
}

fn check_widths(label: &str, rows: &[RawRow]) -> Result<(), NormalizeError> {
    match rows.iter().position(|r| r.width() != COLUMN_COUNT) {
        Some(index) => Err(NormalizeError::RowWidth {
            day: label.to_string(),
            row: index,
            expected: COLUMN_COUNT,
            found: rows[index].width(),
        }),
        None => Ok(()),
    }
}
