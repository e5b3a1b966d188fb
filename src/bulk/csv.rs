//! RFC 4180 CSV: quoted fields may hold delimiters, doubled quotes and line breaks.

use crate::core::{Record, Value};

/// Header row plus data rows, every row padded to the header width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvDocument {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvDocument {
    /// Rows as records of text values, keyed by header.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.clone(), Value::Text(v.clone())))
                    .collect()
            })
            .collect()
    }
}

/// Split text into rows of raw fields.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut field_started = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                c => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                field_started = false;
            }
            c => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if field_started || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Parse a CSV document whose first row is the header.
/// Rows whose cells are all empty are skipped; short rows are padded.
pub fn parse_csv(text: &str) -> CsvDocument {
    let mut rows = parse_rows(text).into_iter();
    let headers: Vec<String> = match rows.next() {
        Some(h) => h.into_iter().map(|s| s.trim().to_string()).collect(),
        None => return CsvDocument::default(),
    };
    let width = headers.len();
    let rows = rows
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .map(|mut row| {
            row.resize(width, String::new());
            row
        })
        .collect();
    CsvDocument { headers, rows }
}

fn needs_quoting(cell: &str) -> bool {
    cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

pub fn escape_cell(cell: &str) -> String {
    if needs_quoting(cell) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn write_line(out: &mut String, cells: impl Iterator<Item = String>) {
    let line: Vec<String> = cells.map(|c| escape_cell(&c)).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

/// Serialize headers and rows, quoting only where required.
pub fn to_csv(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    write_line(&mut out, headers.iter().cloned());
    for row in rows {
        write_line(&mut out, row.iter().cloned());
    }
    out
}

/// Serialize records under the given columns; absent and null values become empty cells.
pub fn records_to_csv(headers: &[String], records: &[Record]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            headers
                .iter()
                .map(|h| r.get(h).map(Value::to_csv_cell).unwrap_or_default())
                .collect()
        })
        .collect();
    to_csv(headers, &rows)
}

/// First line of a CSV payload, used to detect repeated headers across uploads.
pub fn header_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default().trim()
}
