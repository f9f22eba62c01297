//! Minimal quote-aware CSV reader for the dataset files.
//!
//! Handles RFC 4180 quoting (embedded commas, doubled quotes, line breaks
//! inside quotes), CRLF endings, a leading BOM and blank lines.

use std::collections::HashMap;

use crate::error::DatasetError;

/// A data row addressed by header name.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    index: usize,
    fields: &'a [String],
    header: &'a Header,
}

impl<'a> Record<'a> {
    /// Zero-based position among the data rows.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Trimmed cell for `column`; empty when the column or cell is absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &'a str {
        self.header
            .position(column)
            .and_then(|i| self.fields.get(i))
            .map_or("", |v| v.trim())
    }

    /// First non-empty cell among alternative column names.
    #[must_use]
    pub fn get_any(&self, columns: &[&str]) -> &'a str {
        columns
            .iter()
            .map(|c| self.get(c))
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Header {
    positions: HashMap<String, usize>,
}

impl Header {
    fn new(names: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            positions.entry(header_key(name)).or_insert(i);
        }
        Self { positions }
    }

    #[must_use]
    pub fn has(&self, column: &str) -> bool {
        self.positions.contains_key(&header_key(column))
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(&header_key(column)).copied()
    }

    /// # Errors
    ///
    /// Returns `DatasetError::MissingColumn` for the first absent column.
    pub fn require(&self, columns: &[&'static str]) -> Result<(), DatasetError> {
        match columns.iter().find(|c| !self.has(c)) {
            Some(missing) => Err(DatasetError::MissingColumn(*missing)),
            None => Ok(()),
        }
    }
}

fn header_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Parsed CSV document: header plus raw rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    header: Header,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse CSV text. The first non-blank line is the header.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::UnterminatedQuote` if a quoted field never closes.
    pub fn parse(text: &str) -> Result<Self, DatasetError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = split_rows(text)?.into_iter();
        let Some(names) = lines.next() else {
            return Ok(Self::default());
        };
        Ok(Self {
            header: Header::new(&names),
            rows: lines.collect(),
        })
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().enumerate().map(|(index, fields)| Record {
            index,
            fields,
            header: &self.header,
        })
    }
}

fn split_rows(text: &str) -> Result<Vec<Vec<String>>, DatasetError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut quote_line = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DatasetError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }
    Ok(rows)
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    let blank = row.iter().all(|f| f.trim().is_empty());
    if !blank {
        rows.push(row);
    }
}
