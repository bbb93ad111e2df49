//! Substitution table extractor.
//!
//! Each day page holds one table with a fixed number of columns. A class's
//! block starts at an **anchor** row whose first cell is exactly the class id
//! and continues through the directly following rows whose first cell carries
//! a non-breaking space instead of a class id:
//!
//! ```text
//! | MSS12  | 3 | Mül | M  | 204 |  | Raumänderung |   <- anchor
//! | &nbsp; |   | Sch | D  | 101 |  |              |   <- continuation
//! | MSS13  | 1 | ... |                                <- ends the block
//! ```
//!
//! A class may have several blocks on the same page; their rows are returned
//! concatenated in page order.

use crate::error::{ScrapeError, StructureError};
use crate::fetch::PageFetcher;
use crate::models::{Extraction, RawRow};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, trace};
use url::Url;

/// Marker found in the first cell of a continuation row.
pub const CARRY_SENTINEL: char = '\u{a0}';

const TABLE: &str = "table";

static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(TABLE).unwrap());
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());

/// Fetch one day page and extract the rows of `class_id`.
#[instrument(level = "debug", skip_all, fields(%page_url, %class_id))]
pub async fn extract<F: PageFetcher>(
    fetcher: &F,
    page_url: &Url,
    class_id: &str,
) -> Result<Extraction, ScrapeError> {
    let html = fetcher.fetch_page(page_url).await?;
    Ok(extract_from_html(&html, page_url.as_str(), class_id)?)
}

/// Extract the rows of `class_id` from an already fetched page.
///
/// Returns an empty, not-found [`Extraction`] when the class has no anchor row.
///
/// # Errors
///
/// [`StructureError`] when the page has no table at all.
pub fn extract_from_html(
    html: &str,
    page_url: &str,
    class_id: &str,
) -> Result<Extraction, StructureError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&TABLE_SELECTOR)
        .next()
        .ok_or_else(|| StructureError {
            url: page_url.to_string(),
            selector: TABLE,
        })?;

    let mut extraction = Extraction::empty();

    for row in table.select(&ROW_SELECTOR) {
        let Some(first) = row.select(&CELL_SELECTOR).next() else {
            continue;
        };
        if cell_text(first).trim() != class_id {
            continue;
        }

        extraction.found = true;
        extraction.rows.push(row_cells(row));
        debug!(class_id, "Found anchor row");

        let mut next = next_row(row);
        while let Some(candidate) = next.filter(|r| is_continuation(*r)) {
            trace!("Continuation row");
            extraction.rows.push(row_cells(candidate));
            next = next_row(candidate);
        }
    }

    debug!(rows = extraction.rows.len(), found = extraction.found, "Scanned table");
    Ok(extraction)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect()
}

/// All `td` texts of `row`, trimmed, empty cells kept.
fn row_cells(row: ElementRef<'_>) -> RawRow {
    row.select(&CELL_SELECTOR)
        .map(|cell| cell_text(cell).trim().to_string())
        .collect()
}

fn next_row<'a>(row: ElementRef<'a>) -> Option<ElementRef<'a>> {
    row.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
}

fn is_continuation(row: ElementRef<'_>) -> bool {
    row.select(&CELL_SELECTOR)
        .next()
        .is_some_and(|first| cell_text(first).contains(CARRY_SENTINEL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;

    const PAGE: &str = "https://light.dsbcontrol.de/x/subst_001.htm";

    fn table(rows: &str) -> String {
        format!(
            r#"<html><body><center><table class="mon_list">
                <tr class="list"><th>Klasse</th><th>Std</th><th>Lehrer</th><th>Fach</th><th>Raum</th><th>Thema</th><th>Info</th></tr>
                {rows}
            </table></center></body></html>"#
        )
    }

    fn cells(rows: &[RawRow]) -> Vec<Vec<&str>> {
        rows.iter()
            .map(|r| r.0.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_anchor_with_two_continuations_then_other_class() {
        let html = table(
            r#"
            <tr><td>MSS12</td><td>1 - 2</td><td>Mül</td><td>M</td><td>204</td><td></td><td>Vertretung</td></tr>
            <tr><td>&nbsp;</td><td>3</td><td>Sch</td><td>D</td><td>101</td><td>Gedichte</td><td></td></tr>
            <tr><td>&nbsp;</td><td></td><td>Ber</td><td>E</td><td>102</td><td></td><td>entfällt</td></tr>
            <tr><td>MSS13</td><td>4</td><td>Kra</td><td>Ph</td><td>N1</td><td></td><td></td></tr>
            "#,
        );

        let got = extract_from_html(&html, PAGE, "MSS12").unwrap();
        assert!(got.found);
        assert_eq!(
            cells(&got.rows),
            vec![
                vec!["MSS12", "1 - 2", "Mül", "M", "204", "", "Vertretung"],
                vec!["", "3", "Sch", "D", "101", "Gedichte", ""],
                vec!["", "", "Ber", "E", "102", "", "entfällt"],
            ]
        );
    }

    #[test]
    fn test_absent_class_is_empty_not_found() {
        let html = table(
            r#"<tr><td>MSS13</td><td>4</td><td>Kra</td><td>Ph</td><td>N1</td><td></td><td></td></tr>"#,
        );
        let got = extract_from_html(&html, PAGE, "MSS12").unwrap();
        assert_eq!(got, Extraction::empty());
        assert!(!got.found);
    }

    #[test]
    fn test_anchor_match_is_exact_after_trimming() {
        let html = table(
            r#"
            <tr><td> MSS12 </td><td>1</td><td>A</td><td>B</td><td>C</td><td></td><td></td></tr>
            <tr><td>MSS12a</td><td>2</td><td>A</td><td>B</td><td>C</td><td></td><td></td></tr>
            "#,
        );
        let got = extract_from_html(&html, PAGE, "MSS12").unwrap();
        assert_eq!(got.rows.len(), 1);
        assert_eq!(got.rows[0].cell(1), "1");
    }

    #[test]
    fn test_multiple_blocks_are_concatenated_in_page_order() {
        let html = table(
            r#"
            <tr><td>MSS12</td><td>1</td><td>A</td><td>M</td><td>1</td><td></td><td></td></tr>
            <tr><td>&nbsp;</td><td>2</td><td>B</td><td>M</td><td>1</td><td></td><td></td></tr>
            <tr><td>10a</td><td>3</td><td>C</td><td>D</td><td>2</td><td></td><td></td></tr>
            <tr><td>&nbsp;</td><td>4</td><td>D</td><td>D</td><td>2</td><td></td><td></td></tr>
            <tr><td>MSS12</td><td>5</td><td>E</td><td>E</td><td>3</td><td></td><td></td></tr>
            "#,
        );
        let got = extract_from_html(&html, PAGE, "MSS12").unwrap();
        let positions: Vec<_> = got.rows.iter().map(|r| r.cell(1)).collect();
        assert_eq!(positions, ["1", "2", "5"]);
    }

    #[test]
    fn test_continuation_scan_stops_at_header_row() {
        let html = table(
            r#"
            <tr><td>MSS12</td><td>1</td><td>A</td><td>M</td><td>1</td><td></td><td></td></tr>
            <tr><th>&nbsp;</th></tr>
            <tr><td>&nbsp;</td><td>2</td><td>B</td><td>M</td><td>1</td><td></td><td></td></tr>
            "#,
        );
        let got = extract_from_html(&html, PAGE, "MSS12").unwrap();
        assert_eq!(got.rows.len(), 1);
    }

    #[test]
    fn test_empty_cells_are_kept() {
        let html = table(
            r#"<tr><td>MSS12</td><td></td><td></td><td></td><td></td><td></td><td></td></tr>"#,
        );
        let got = extract_from_html(&html, PAGE, "MSS12").unwrap();
        assert_eq!(got.rows[0].width(), 7);
    }

    #[test]
    fn test_page_without_table_is_structure_error() {
        let err = extract_from_html("<p>Kein Vertretungsplan</p>", PAGE, "MSS12").unwrap_err();
        assert_eq!(err.selector, "table");
    }

    #[tokio::test]
    async fn test_extract_fetches_page() {
        let html = table(
            r#"<tr><td>MSS12</td><td>1</td><td>A</td><td>M</td><td>1</td><td></td><td></td></tr>"#,
        );
        let fetcher = StaticFetcher::new().with_page(PAGE, &html);
        let got = extract(&fetcher, &Url::parse(PAGE).unwrap(), "MSS12")
            .await
            .unwrap();
        assert!(got.found);
        assert_eq!(fetcher.requests(), vec![PAGE.to_string()]);
    }
}
