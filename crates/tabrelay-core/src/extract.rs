//! Table extraction from raw markup documents.
//!
//! Locates `<table>` structures, takes the first row as headers, and cleans
//! data rows: citation markers stripped, whitespace collapsed, spurious
//! repeated-header rows and fully empty rows discarded. Null sentinels
//! (`""`, `"-"`, `"N/A"`) are left intact here; they are resolved at
//! conversion time by the inference engine.

use crate::error::ParseError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("static selector"));
static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("static selector"));

/// Citation-bracket markers common in scraped documents: `[1]`, `[a]`,
/// `[citation needed]`.
static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("static regex"));

/// An extracted table: ordered headers plus ordered rows of raw text cells.
///
/// Invariant: every row has exactly `headers.len()` cells after padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTable {
    /// Cleaned header texts in document order
    pub headers: Vec<String>,

    /// Cleaned data rows, each padded to the header width
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    /// Number of columns.
    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

/// Extract all table-like structures from a markup document.
///
/// A single malformed table is skipped with a warning and extraction
/// continues; zero tables is a non-fatal empty result.
pub fn extract_tables(document: &str) -> Vec<ExtractedTable> {
    let html = Html::parse_document(document);
    let mut tables = Vec::new();

    for (index, element) in html.select(&TABLE_SELECTOR).enumerate() {
        match extract_one(element, index) {
            Ok(table) => {
                debug!(
                    index = index,
                    columns = table.width(),
                    rows = table.rows.len(),
                    "Table extracted"
                );
                tables.push(table);
            }
            Err(e) => {
                warn!(index = index, error = %e, "Skipping malformed table");
            }
        }
    }

    if tables.is_empty() {
        debug!("No tables found in document");
    }

    tables
}

fn extract_one(element: ElementRef<'_>, index: usize) -> Result<ExtractedTable, ParseError> {
    let mut row_iter = element.select(&ROW_SELECTOR);

    let header_row = row_iter.next().ok_or(ParseError::MalformedTable {
        index,
        message: "table has no rows".into(),
    })?;

    let mut headers: Vec<String> = header_row
        .select(&CELL_SELECTOR)
        .map(|cell| clean_cell(&cell_text(cell)))
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for row_el in row_iter {
        let cells: Vec<String> = row_el
            .select(&CELL_SELECTOR)
            .map(|cell| clean_cell(&cell_text(cell)))
            .collect();
        rows.push(cells);
    }

    // A header row wider than any data row still defines the table width;
    // a data row wider than the header extends it with synthesized names.
    let width = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);

    if width == 0 {
        return Err(ParseError::MalformedTable {
            index,
            message: "table has no cells".into(),
        });
    }

    while headers.len() < width {
        headers.push(String::new());
    }

    let rows = rows
        .into_iter()
        .filter(|cells| !is_repeated_header(cells, &headers))
        .filter(|cells| !cells.iter().all(String::is_empty))
        .map(|mut cells| {
            cells.resize(width, String::new());
            cells
        })
        .collect();

    Ok(ExtractedTable { headers, rows })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ")
}

/// Strip citation markers and collapse internal whitespace.
pub fn clean_cell(raw: &str) -> String {
    let stripped = CITATION_RE.replace_all(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A row repeating the header text (case-insensitively, per cell) is a
/// scraping artifact, not data.
fn is_repeated_header(cells: &[String], headers: &[String]) -> bool {
    !cells.is_empty()
        && cells.len() <= headers.len()
        && cells
            .iter()
            .zip(headers)
            .all(|(cell, header)| cell.eq_ignore_ascii_case(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_cell_strips_citations_and_whitespace() {
        assert_eq!(clean_cell("France[1]"), "France");
        assert_eq!(clean_cell("  1 234\n567 [a] "), "1 234 567");
        assert_eq!(clean_cell("value[citation needed]"), "value");
    }

    #[test]
    fn test_basic_extraction() {
        let html = r#"
            <table>
                <tr><th>Name</th><th>Age</th></tr>
                <tr><td>John</td><td>30</td></tr>
                <tr><td>Jane</td><td>25</td></tr>
            </table>
        "#;
        let tables = extract_tables(html);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["Name", "Age"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[0], vec!["John", "30"]);
    }

    #[test]
    fn test_empty_row_dropped() {
        let html = r#"
            <table>
                <tr><th>Name</th><th>Age</th></tr>
                <tr><td>John</td><td>30</td></tr>
                <tr><td></td><td></td></tr>
            </table>
        "#;
        let tables = extract_tables(html);
        assert_eq!(tables[0].rows.len(), 1);
    }

    #[test]
    fn test_repeated_header_dropped() {
        let html = r#"
            <table>
                <tr><th>Name</th><th>Age</th></tr>
                <tr><td>John</td><td>30</td></tr>
                <tr><td>NAME</td><td>age</td></tr>
                <tr><td>Jane</td><td>25</td></tr>
            </table>
        "#;
        let tables = extract_tables(html);
        assert_eq!(tables[0].rows.len(), 2);
    }

    #[test]
    fn test_short_row_padded() {
        let html = r#"
            <table>
                <tr><th>A</th><th>B</th><th>C</th></tr>
                <tr><td>1</td><td>2</td></tr>
            </table>
        "#;
        let tables = extract_tables(html);
        assert_eq!(tables[0].rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn test_wide_row_extends_headers() {
        let html = r#"
            <table>
                <tr><th>A</th></tr>
                <tr><td>1</td><td>2</td></tr>
            </table>
        "#;
        let tables = extract_tables(html);
        assert_eq!(tables[0].headers, vec!["A", ""]);
        assert_eq!(tables[0].rows[0], vec!["1", "2"]);
    }

    #[test]
    fn test_no_tables_is_empty_result() {
        let tables = extract_tables("<p>no tables here</p>");
        assert!(tables.is_empty());
    }

    #[test]
    fn test_rowless_table_skipped() {
        let html = "<table></table><table><tr><th>X</th></tr><tr><td>1</td></tr></table>";
        let tables = extract_tables(html);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["X"]);
    }

    #[test]
    fn test_null_sentinels_survive_extraction() {
        let html = r#"
            <table>
                <tr><th>A</th><th>B</th></tr>
                <tr><td>-</td><td>N/A</td></tr>
            </table>
        "#;
        let tables = extract_tables(html);
        assert_eq!(tables[0].rows[0], vec!["-", "N/A"]);
    }
}
