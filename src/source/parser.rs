//! DataTables response parser
//!
//! Stateless conversion of DataTables server-side-processing JSON into
//! [`Record`]s. Cells are reduced to the text a browser would render: markup
//! is stripped, entities are decoded and whitespace is trimmed.

use crate::source::{SourceError, SourceResult};
use crate::Record;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// Server-side-processing response body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTablesResponse {
    /// Echo of the request's draw counter
    #[serde(default, deserialize_with = "deserialize_count")]
    pub draw: Option<u64>,
    /// Entries before filtering
    #[serde(default, deserialize_with = "deserialize_count")]
    pub records_total: Option<u64>,
    /// Entries after filtering; this is what the table pages over
    #[serde(default, deserialize_with = "deserialize_count")]
    pub records_filtered: Option<u64>,
    /// Row data, arrays or objects
    #[serde(default)]
    pub data: Vec<Value>,
    /// Server-reported error
    #[serde(default)]
    pub error: Option<String>,
}

impl DataTablesResponse {
    /// Entries the table pages over
    pub fn entry_count(&self) -> Option<u64> {
        self.records_filtered.or(self.records_total)
    }
}

/// Counts arrive as numbers or, from some backends, as strings like `"17,056"`.
fn deserialize_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    })
}

/// Stateless parser for DataTables payloads
pub struct DataTablesParser;

impl DataTablesParser {
    /// Parse a response body
    pub fn parse_response(body: &str) -> SourceResult<DataTablesResponse> {
        let response: DataTablesResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::ParseError(format!("Invalid DataTables response: {e}")))?;
        if let Some(error) = &response.error {
            return Err(SourceError::HttpError(format!("Server reported error: {error}")));
        }
        Ok(response)
    }

    /// Convert rows to records
    ///
    /// Array rows are mapped positionally onto `columns` and rows shorter than
    /// `columns` are skipped. With no configured columns, array cells are named
    /// `column_1`, `column_2`, ... Object rows put the configured columns first,
    /// then any remaining keys.
    pub fn parse_rows(rows: &[Value], columns: &[String]) -> SourceResult<Vec<Record>> {
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;

        for row in rows {
            match row {
                Value::Array(cells) => {
                    if columns.is_empty() {
                        records.push(
                            cells
                                .iter()
                                .enumerate()
                                .map(|(i, cell)| (format!("column_{}", i + 1), cell_text(cell)))
                                .collect(),
                        );
                    } else if cells.len() < columns.len() {
                        skipped += 1;
                    } else {
                        records.push(
                            columns
                                .iter()
                                .zip(cells)
                                .map(|(name, cell)| (name.clone(), cell_text(cell)))
                                .collect(),
                        );
                    }
                }
                Value::Object(map) => {
                    let mut record = Record::new();
                    for name in columns {
                        record.insert(name.clone(), map.get(name).map(cell_text).unwrap_or_default());
                    }
                    for (name, cell) in map {
                        if !columns.iter().any(|c| c == name) {
                            record.insert(name.clone(), cell_text(cell));
                        }
                    }
                    records.push(record);
                }
                other => {
                    return Err(SourceError::ParseError(format!(
                        "Row is neither an array nor an object: {other}"
                    )));
                }
            }
        }

        if skipped > 0 {
            warn!(skipped, expected_cells = columns.len(), "Skipped short rows");
        }
        Ok(records)
    }
}

/// Visible text of a cell
pub fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => strip_markup(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Drop tags, decode entities and trim
///
/// `<` opens a tag only when followed by a letter, `/` or `!`, so plain text
/// such as `3 < 5` is kept.
pub fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();
    while let Some(c) = chars.next() {
        let opens_tag = c == '<'
            && chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '/' || *n == '!');
        if opens_tag {
            for t in chars.by_ref() {
                if t == '>' {
                    break;
                }
            }
        } else {
            text.push(c);
        }
    }
    decode_entities(&text).trim().to_string()
}

/// Longest entity name looked at after `&`
const MAX_ENTITY_LEN: usize = 10;

/// Single-pass entity decoding; unknown references are left as written
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= MAX_ENTITY_LEN)
            .and_then(|end| decode_entity(&tail[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some(' '),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(|c| c == 'x' || c == 'X') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}
