//! Flat-record protocol
//!
//! A script returns one text blob. Records are joined with a record
//! separator, fields with a field separator, and labeled multi-value fields
//! (a contact's emails, say) use a third list separator inside one field.
//! Generated scripts percent-encode every character that appears in any
//! separator before joining, so separators never occur inside field content.
//!
//! A [`RecordSchema`] is the single description of one result shape: the
//! script builder emits rows from it and [`RecordSchema::decode`] reads them
//! back, so the two halves cannot drift.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::types::LabeledValue;

pub const FIELD_SEP: &str = "|||";
pub const RECORD_SEP: &str = ":::";
pub const LIST_SEP: &str = ";;;";
pub const PAIR_SEP: &str = "=";
pub const TAB: &str = "\t";
pub const NEWLINE: &str = "\n";

/// Characters percent-encoded inside field values, paired with the
/// AppleScript expression that denotes each one. `%` must stay first.
pub(crate) const ENCODED_CHARS: &[(char, &str)] = &[
    ('%', "\"%\""),
    ('|', "\"|\""),
    (':', "\":\""),
    (';', "\";\""),
    ('=', "\"=\""),
    ('\t', "tab"),
    ('\n', "linefeed"),
    ('\r', "return"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any value coerced to text
    Text,
    /// A date, emitted as ISO 8601 local time
    Date,
    /// A collection of label/value items joined with the list separator
    Labeled,
}

/// One positional field: its name, the AppleScript expression producing it
/// (in terms of the loop variable `rec`), and how it is emitted.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub expr: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn text(name: &'static str, expr: &'static str) -> Self {
        Self { name, expr, kind: FieldKind::Text }
    }

    pub const fn date(name: &'static str, expr: &'static str) -> Self {
        Self { name, expr, kind: FieldKind::Date }
    }

    pub const fn labeled(name: &'static str, expr: &'static str) -> Self {
        Self { name, expr, kind: FieldKind::Labeled }
    }
}

/// Versioned description of one operation's result shape
#[derive(Debug)]
pub struct RecordSchema {
    pub name: &'static str,
    pub record_sep: &'static str,
    pub field_sep: &'static str,
    /// Records with fewer fields are dropped
    pub min_fields: usize,
    pub fields: &'static [Field],
}

impl RecordSchema {
    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Decode a bridge payload into records of this schema
    pub fn decode(&'static self, text: &str) -> Result<Vec<Record>> {
        let rows = split_records(text, self.record_sep, self.field_sep, self.min_fields);
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fields = Vec::with_capacity(row.len());
            for (idx, raw) in row.into_iter().enumerate() {
                let labeled = self
                    .fields
                    .get(idx)
                    .is_some_and(|f| f.kind == FieldKind::Labeled);
                if labeled {
                    fields.push(raw);
                } else {
                    fields.push(decode_field(self.name, &raw)?);
                }
            }
            records.push(Record { schema: self, fields });
        }
        Ok(records)
    }
}

/// Split a payload into records of fields.
///
/// Empty segments (the trailing one after a final separator in particular)
/// are discarded. Records shorter than `min_fields` are dropped whole, never
/// padded.
pub fn split_records(
    text: &str,
    record_sep: &str,
    field_sep: &str,
    min_fields: usize,
) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut dropped = 0usize;
    for segment in text.split(record_sep) {
        if segment.is_empty() {
            continue;
        }
        let fields: Vec<String> = segment.split(field_sep).map(str::to_string).collect();
        if fields.len() < min_fields {
            dropped += 1;
            continue;
        }
        records.push(fields);
    }
    if dropped > 0 {
        warn!(
            "Dropped {} malformed record(s) with fewer than {} fields",
            dropped, min_fields
        );
    }
    records
}

fn decode_field(schema: &str, raw: &str) -> Result<String> {
    if !raw.contains('%') {
        return Ok(raw.to_string());
    }
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| BridgeError::decode(schema, format!("Invalid field encoding: {}", e)))
}

/// Strip the `_$!<Label>!$_` wrapper the address book uses for built-in labels
pub fn clean_label(raw: &str) -> String {
    raw.strip_prefix("_$!<")
        .and_then(|s| s.strip_suffix(">!$_"))
        .unwrap_or(raw)
        .to_string()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%A, %B %d, %Y at %I:%M:%S %p",
    "%A, %d %B %Y at %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%A, %B %d, %Y", "%m/%d/%Y"];

/// Parse a date/time by trying each known format in order.
/// Date-only values resolve to midnight.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// One decoded row, addressed by schema field name
#[derive(Debug, Clone)]
pub struct Record {
    schema: &'static RecordSchema,
    fields: Vec<String>,
}

impl Record {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw field value; `None` when the field is beyond this record's length
    pub fn get(&self, name: &str) -> Option<&str> {
        let idx = self.schema.position(name);
        debug_assert!(idx.is_some(), "{} has no field {}", self.schema.name, name);
        idx.and_then(|i| self.fields.get(i)).map(String::as_str)
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    /// Literal `true` / `false`; a missing field reads as false
    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.get(name).unwrap_or("false") {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(self.invalid(name, "boolean", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.get(name).map(str::trim) {
            None | Some("") => Ok(0),
            Some(v) => v.parse().map_err(|_| self.invalid(name, "integer", v)),
        }
    }

    /// Non-negative size; tolerates real-number output like `1.2345E+6`
    pub fn size(&self, name: &str) -> Result<Option<u64>> {
        match self.get(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| Some(n.round() as u64))
                .ok_or_else(|| self.invalid(name, "size", v)),
        }
    }

    pub fn date(&self, name: &str) -> Result<Option<NaiveDateTime>> {
        match self.get(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => parse_datetime(v)
                .map(Some)
                .ok_or_else(|| self.invalid(name, "date", v)),
        }
    }

    /// Labeled list items; labels lose their address-book wrapper
    pub fn labeled(&self, name: &str) -> Result<Vec<LabeledValue>> {
        let raw = self.get(name).unwrap_or_default();
        let mut items = Vec::new();
        for item in raw.split(LIST_SEP).filter(|s| !s.is_empty()) {
            let (label, value) = item.split_once(PAIR_SEP).unwrap_or(("", item));
            items.push(LabeledValue {
                label: clean_label(&decode_field(self.schema.name, label)?),
                value: decode_field(self.schema.name, value)?,
            });
        }
        Ok(items)
    }

    fn invalid(&self, field: &str, expected: &str, got: &str) -> BridgeError {
        BridgeError::decode(
            self.schema.name,
            format!("Field '{}' is not a valid {}: {:?}", field, expected, got),
        )
        .with_context("field", field)
    }
}
