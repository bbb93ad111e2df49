//! Day-index page resolver.
//!
//! The posting selected from the listing service points at a small HTML page
//! with one `ul.day-index` list. Each link in it names a weekday and a date
//! and points, relative to the index page, at that day's substitution table:
//!
//! ```html
//! <ul class="day-index">
//!   <li><a href="subst_001.htm">Montag 02.09.2024</a></li>
//!   <li><a href="subst_002.htm">Dienstag 03.09.2024</a></li>
//! </ul>
//! ```
//!
//! Entries come back in list order, labelled `<weekday>_<date>`.

use crate::error::{ScrapeError, StructureError};
use crate::fetch::PageFetcher;
use crate::models::{DayIndexEntry, WeekDay};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DAY_LIST: &str = "ul.day-index";

static DAY_LIST_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(DAY_LIST).unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static DATE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}\.\d{1,2}\.\d{2,4}").unwrap());

/// Fetch the index page and resolve its day links.
///
/// # Errors
///
/// [`ScrapeError::Fetch`] when the page cannot be retrieved, [`ScrapeError::Structure`]
/// when it has no day list. A list without usable links is not an error.
#[instrument(level = "info", skip_all, fields(%index_url))]
pub async fn resolve<F: PageFetcher>(
    fetcher: &F,
    index_url: &Url,
) -> Result<Vec<DayIndexEntry>, ScrapeError> {
    let html = fetcher.fetch_page(index_url).await?;
    let days = parse_day_index(&html, index_url)?;

    if days.is_empty() {
        warn!("Day index lists no usable days");
    } else {
        info!(
            count = days.len(),
            days = %days.iter().map(|d| d.label.as_str()).join(" and "),
            "Resolved day index"
        );
    }
    Ok(days)
}

/// Parse an already fetched index page. Relative links resolve against `page_url`.
pub fn parse_day_index(html: &str, page_url: &Url) -> Result<Vec<DayIndexEntry>, StructureError> {
    let document = Html::parse_document(html);
    let list = document
        .select(&DAY_LIST_SELECTOR)
        .next()
        .ok_or_else(|| StructureError {
            url: page_url.to_string(),
            selector: DAY_LIST,
        })?;

    let mut seen = HashSet::new();
    let mut days = Vec::new();

    for link in list.select(&LINK_SELECTOR) {
        let text = link.text().collect::<String>();
        let text = text.split_whitespace().join(" ");

        let Some(href) = link.value().attr("href") else {
            debug!(%text, "Skipping day link without href");
            continue;
        };
        let Some(weekday) = WeekDay::find_in(&text) else {
            debug!(%text, "Skipping link without a weekday");
            continue;
        };
        let url = match page_url.join(href) {
            Ok(url) => url,
            Err(e) => {
                warn!(%href, error = %e, "Skipping day link with unusable href");
                continue;
            }
        };
        let date = DATE_TOKEN
            .find(&text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let label = format!("{weekday}_{date}");
        if !seen.insert(label.clone()) {
            warn!(%label, %url, "Duplicate day label; keeping the first occurrence");
            continue;
        }

        debug!(%label, %url, "Added day");
        days.push(DayIndexEntry {
            label,
            weekday: weekday.to_string(),
            date,
            url,
        });
    }

    Ok(days)
}
