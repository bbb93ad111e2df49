//! One scrape-and-publish run.
//!
//! ```text
//! day index ──► per-day extraction ──► raw scrape ──► change gate ──► normalize ──► validate ──► publish
//! ```
//!
//! Stages receive everything they need through [`Pipeline`]; nothing reads
//! ambient state. Per-day pages are fetched concurrently (bounded by
//! `Settings::concurrency`) but results keep day-index order. A day whose page
//! fails to load or parse contributes an empty row list and the run goes on.

use crate::config::Settings;
use crate::error::{RunError, ScrapeError};
use crate::fetch::PageFetcher;
use crate::models::{DayIndexEntry, FormattedDocument, RawScrape};
use crate::normalize::EntryNormalizer;
use crate::outputs::{json, snapshot};
use crate::schema::Schema;
use crate::scrapers::{day_index, substitutions};
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};
use url::Url;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Scrape identical to the last snapshot; nothing was published.
    Unchanged,
    /// A new document was validated and published.
    Published(FormattedDocument),
}

/// Explicit context shared by all stages of a run.
#[derive(Debug)]
pub struct Pipeline<'a, F> {
    settings: &'a Settings,
    fetcher: &'a F,
    schema: &'a Schema,
}

impl<'a, F: PageFetcher> Pipeline<'a, F> {
    pub fn new(settings: &'a Settings, fetcher: &'a F, schema: &'a Schema) -> Self {
        Self {
            settings,
            fetcher,
            schema,
        }
    }

    /// Resolve the day index and extract every day.
    ///
    /// # Errors
    ///
    /// Only a failure on the index page itself; day pages never fail the scrape.
    pub async fn scrape(&self, index_url: &Url) -> Result<RawScrape, ScrapeError> {
        let days = day_index::resolve(self.fetcher, index_url).await?;
        Ok(self.scrape_days(&days).await)
    }

    /// Extract the target class from each day page, in `days` order.
    #[instrument(level = "info", skip_all, fields(days = days.len(), course = %self.settings.course))]
    pub async fn scrape_days(&self, days: &[DayIndexEntry]) -> RawScrape {
        let fetcher = self.fetcher;
        let course = self.settings.course.as_str();

        let results: Vec<_> = stream::iter(days)
            .map(move |day| async move {
                let rows = match substitutions::extract(fetcher, &day.url, course).await {
                    Ok(extraction) if extraction.found => {
                        info!(day = %day.label, rows = extraction.rows.len(), "{}: found {}", day.label, course);
                        extraction.rows
                    }
                    Ok(_) => {
                        info!(day = %day.label, "{}: class {} not found", day.label, course);
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(day = %day.label, url = %day.url, error = %e, "Failed to scrape day; recording it as empty");
                        Vec::new()
                    }
                };
                (day.label.clone(), rows)
            })
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let mut scrape = RawScrape::new();
        for (label, rows) in results {
            scrape.insert(label, rows);
        }
        scrape
    }

    /// Run every stage against the day index at `index_url`.
    ///
    /// The change gate closes the run with [`RunOutcome::Unchanged`] when the
    /// scrape matches the snapshot, unless `Settings::development` is set. If a
    /// changed scrape fails normalization or publication, the previous snapshot
    /// is restored so the next run retries instead of reporting unchanged.
    #[instrument(level = "info", skip_all, fields(%index_url))]
    pub async fn run(&self, index_url: &Url) -> Result<RunOutcome, RunError> {
        let scrape = self.scrape(index_url).await?;
        info!(days = scrape.len(), rows = scrape.row_count(), "Scrape complete");

        if scrape.is_empty() {
            warn!("Day index yielded no days; publishing an empty document if changed");
        }

        let raw_file = &self.settings.raw_file;
        let previous = snapshot::backup(raw_file).await;
        let changed = snapshot::commit_if_changed(&scrape, raw_file).await?;
        if !changed {
            if !self.settings.development {
                info!("No changes detected in scraped data");
                return Ok(RunOutcome::Unchanged);
            }
            info!("No changes detected; continuing because development mode is on");
        }

        match self.publish(&scrape).await {
            Ok(document) => Ok(RunOutcome::Published(document)),
            Err(e) => {
                if changed {
                    if let Err(rollback) = snapshot::restore(raw_file, previous.as_deref()).await {
                        warn!(error = %rollback, "Could not roll back snapshot after failed publication");
                    }
                }
                Err(e)
            }
        }
    }

    async fn publish(&self, scrape: &RawScrape) -> Result<FormattedDocument, RunError> {
        let document = EntryNormalizer::new(self.settings.course.as_str()).normalize(scrape)?;
        json::publish(&document, self.schema, &self.settings.output).await?;
        Ok(document)
    }
}
