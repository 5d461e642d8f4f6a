//! Spreadsheet fallback for brokers that publish inventory as a file download
//!
//! When a page links to a `.csv`, `.xlsx` or `.xls` file, the file is fetched
//! and every row becomes a listing. Columns are mapped by header name; rows
//! that read like residential real estate are dropped.

use super::fields;
use super::listing::{truncate, ExtractedListing, SNIPPET_CHARS};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use regex::Regex;
use scraper::{Html, Selector};
use std::io::Cursor;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

/// Phrases that mark text as describing a business rather than a property
const BUSINESS_HINTS: &[&str] = &[
    "asking price", "cash flow", "revenue", "business for sale", "training", "turnkey",
    "profitable", "route type", "financing", "route details", "distribution", "delivery route",
    "route business", "gross sales", "net income", "ebitda", "asking", "price",
    "business opportunity", "owner", "operated", "franchise", "inventory", "equipment", "lease",
    "real estate included", "seller financing", "terms available", "business type",
    "years in business", "employees", "customers", "clientele", "ff&e", "fixtures", "goodwill",
    "for sale by owner", "restaurant", "retail", "service", "manufacturing", "wholesale",
    "absentee", "semi-absentee", "owner-operator",
];

const TITLE_COLUMNS: &[&str] = &["name", "title", "business", "description"];
const PRICE_COLUMNS: &[&str] = &["price", "asking", "value"];
const LOCATION_COLUMNS: &[&str] = &["location", "city", "state", "area"];

static DOLLAR_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$[\d,]+(?:\.\d{2})?").expect("hardcoded regex pattern is valid")
});

/// Errors raised while decoding a downloaded file
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Spreadsheet has no worksheet")]
    NoWorksheet,
}

/// Kind of listing file, told apart by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    /// Excel workbook, `.xlsx` or legacy `.xls`
    Spreadsheet,
}

impl FileFormat {
    pub fn from_url(url: &Url) -> Option<Self> {
        let path = url.path().to_lowercase();
        if path.ends_with(".csv") {
            Some(Self::Csv)
        } else if path.ends_with(".xlsx") || path.ends_with(".xls") {
            Some(Self::Spreadsheet)
        } else {
            None
        }
    }
}

/// One data row of a downloaded file, as `(header, value)` pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularRow {
    /// Zero-based position of the row below the header
    pub index: usize,
    pub columns: Vec<(String, String)>,
}

impl TabularRow {
    /// First non-empty value among columns whose header contains any of `names`
    fn value_for(&self, names: &[&str]) -> Option<&str> {
        self.columns
            .iter()
            .filter(|(header, _)| {
                let header = header.to_lowercase();
                names.iter().any(|n| header.contains(n))
            })
            .map(|(_, value)| value.as_str())
            .find(|value| !value.is_empty())
    }

    /// Row flattened to `header: value | header: value`
    pub fn description(&self) -> String {
        self.columns
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(header, value)| format!("{}: {}", header, value))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// True when text carries any business hint phrase
pub fn looks_like_business(text: &str) -> bool {
    let lowered = text.to_lowercase();
    BUSINESS_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Decides whether a synthesized row describes a business for sale
///
/// Real-estate text is rejected; otherwise a business hint or a dollar
/// amount is enough.
pub fn classify_business(text: &str) -> bool {
    if fields::is_real_estate(text) {
        return false;
    }
    looks_like_business(text) || DOLLAR_AMOUNT.is_match(text)
}

/// Finds the first link on the page pointing at a CSV or spreadsheet file
pub fn find_download_link(document: &Html, base: &Url) -> Option<Url> {
    let selector = Selector::parse("a[href]").ok()?;
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .find(|url| FileFormat::from_url(url).is_some())
}

/// Decodes a downloaded file into rows keyed by its header line
pub fn parse_file(format: FileFormat, bytes: &[u8]) -> Result<Vec<TabularRow>, TabularError> {
    match format {
        FileFormat::Csv => Ok(parse_csv(bytes)?),
        FileFormat::Spreadsheet => parse_spreadsheet(bytes),
    }
}

/// Parses CSV bytes into rows keyed by the header line
///
/// Rows may be shorter or longer than the header; extra cells are dropped.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<TabularRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let columns = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(TabularRow { index, columns });
    }

    Ok(rows)
}

/// Reads the first worksheet of an `.xlsx` or `.xls` workbook
pub fn parse_spreadsheet(bytes: &[u8]) -> Result<Vec<TabularRow>, TabularError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(TabularError::NoWorksheet)??;
    Ok(rows_from_range(&range))
}

/// Converts a worksheet range into rows, taking its first row as the header
pub fn rows_from_range(range: &Range<Data>) -> Vec<TabularRow> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header.iter().map(cell_text).collect();

    rows.enumerate()
        .map(|(index, cells)| TabularRow {
            index,
            columns: headers
                .iter()
                .zip(cells.iter())
                .map(|(h, cell)| (h.clone(), cell_text(cell)))
                .collect(),
        })
        .collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        // Whole-number prices are stored as floats
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        other => other.to_string().trim().to_string(),
    }
}

/// Turns one row into a listing, or `None` if it does not read as a business
///
/// The listing URL is the file URL with a `#row{index}` fragment, which keeps
/// identifiers distinct per row and stable across runs.
pub fn row_to_listing(row: &TabularRow, file_url: &Url) -> Option<ExtractedListing> {
    let description = row.description();
    if description.is_empty() || !classify_business(&description) {
        return None;
    }

    let title = row
        .value_for(TITLE_COLUMNS)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Business Listing {}", row.index + 1));

    let price_raw = row.value_for(PRICE_COLUMNS).map(str::to_string);
    let price = price_raw.as_deref().and_then(fields::parse_money);

    let location_raw = row.value_for(LOCATION_COLUMNS).map(str::to_string);
    let parsed_location = location_raw.as_deref().and_then(fields::extract_location);

    let mut url = file_url.clone();
    url.set_fragment(Some(&format!("row{}", row.index)));

    Some(ExtractedListing {
        title,
        url: Some(url.to_string()),
        price_raw,
        price,
        location: location_raw,
        city: parsed_location.as_ref().and_then(|l| l.city.clone()),
        state: parsed_location.and_then(|l| l.state),
        business_type: fields::classify_business_type(&description).map(str::to_string),
        revenue: fields::extract_revenue(&description),
        cash_flow: fields::extract_cash_flow(&description),
        snippet: truncate(&description, SNIPPET_CHARS),
    })
}

/// Converts every accepted row of a file into a listing
pub fn rows_to_listings(rows: &[TabularRow], file_url: &Url) -> Vec<ExtractedListing> {
    rows.iter()
        .filter_map(|row| row_to_listing(row, file_url))
        .collect()
}
