//! HTML scrapers for the substitution site.
//!
//! Scraping happens in two phases:
//!
//! 1. **Indexing** ([`day_index`]): read the day-index page and resolve one URL per day.
//! 2. **Extraction** ([`substitutions`]): walk each day's table and keep the rows of
//!    the target class.
//!
//! Both modules expose an async entry point generic over
//! [`PageFetcher`](crate::fetch::PageFetcher) plus a pure `*_from_html`/`parse_*`
//! function that works on an already fetched page.

pub mod day_index;
pub mod substitutions;
