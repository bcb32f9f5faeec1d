// src/parse/mod.rs
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Fatal parse failures. Nothing is processed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("input contains no header line")]
    EmptyInput,
    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },
}

/// A single malformed data line. Surfaced later as a rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowParseError {
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
}

impl RowParseError {
    pub fn line(&self) -> usize {
        match self {
            RowParseError::ColumnCountMismatch { line, .. } => *line,
        }
    }
}

/// One data line, keyed by lower-cased header name in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based physical line number in the input.
    pub line: usize,
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    /// Case-insensitive lookup; the first matching column wins.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Default)]
pub struct ParsedInput {
    /// Header tokens, trimmed and lower-cased.
    pub header: Vec<String>,
    pub records: Vec<RawRecord>,
    pub malformed: Vec<RowParseError>,
}

impl ParsedInput {
    /// Well-formed records plus malformed lines.
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.malformed.len()
    }
}

/// Parse comma-separated text into raw records.
///
/// Splitting is a plain split on `,` with no quoting dialect: a quoted field
/// containing a comma produces a column count mismatch for its line. Fields
/// are trimmed but quotes are left in place.
#[instrument(level = "debug", skip(raw_text, required_columns), fields(bytes = raw_text.len()))]
pub fn parse(raw_text: &str, required_columns: &[&str]) -> Result<ParsedInput, ParseError> {
    let mut lines = raw_text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty());

    let (header_line, header_text) = lines.next().ok_or(ParseError::EmptyInput)?;
    let header: Vec<String> = split_fields(header_text)
        .map(|token| token.to_lowercase())
        .collect();
    debug!(line = header_line, columns = ?header, "header");

    let mut missing: Vec<String> = Vec::new();
    for column in required_columns.iter().map(|c| c.trim().to_lowercase()) {
        if !header.contains(&column) && !missing.contains(&column) {
            missing.push(column);
        }
    }
    if !missing.is_empty() {
        warn!(?missing, "required columns absent from header");
        return Err(ParseError::MissingColumns { missing });
    }

    let mut parsed = ParsedInput {
        header,
        ..Default::default()
    };
    for (line, text) in lines {
        let values: Vec<&str> = split_fields(text).collect();
        if values.len() != parsed.header.len() {
            parsed.malformed.push(RowParseError::ColumnCountMismatch {
                line,
                expected: parsed.header.len(),
                found: values.len(),
            });
            continue;
        }
        let fields = parsed
            .header
            .iter()
            .cloned()
            .zip(values.into_iter().map(str::to_string))
            .collect();
        parsed.records.push(RawRecord { line, fields });
    }

    debug!(
        records = parsed.records.len(),
        malformed = parsed.malformed.len(),
        "parsed input"
    );
    Ok(parsed)
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(',').map(str::trim)
}
