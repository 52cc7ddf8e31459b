//! Entry documents as stored by the backend.
//!
//! Field names (`year`, `month`, `day`, `images`, `audioURL`) are a de facto
//! schema shared with every document ever written, so decoding is lenient:
//! unknown fields are ignored, malformed values are skipped, and documents
//! from the older schema that only carry a combined `date` are still read.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use daybook_shared::constants::{
    FIELD_AUDIO_URL, FIELD_DAY, FIELD_IMAGES, FIELD_MONTH, FIELD_YEAR, LEGACY_FIELD_DATE,
};
use daybook_shared::{DateKey, JournalEntry};

/// Raw field map of one document.
pub type Document = Map<String, Value>;

/// A document as delivered by the feed: backend id plus fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub id: String,
    pub fields: Document,
}

impl EntrySnapshot {
    pub fn new(id: impl Into<String>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn to_entry(&self) -> JournalEntry {
        decode_entry(self)
    }
}

/// Decode a snapshot into an entry with no pending images.
pub fn decode_entry(snapshot: &EntrySnapshot) -> JournalEntry {
    let fields = &snapshot.fields;

    let images = fields
        .get(FIELD_IMAGES)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let audio_url = fields
        .get(FIELD_AUDIO_URL)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    JournalEntry {
        id: Some(snapshot.id.clone()),
        date: decode_date(fields),
        audio_url,
        images,
        local_images: Vec::new(),
    }
}

/// The date-key fields for `date`, as written alongside every update.
pub fn date_fields(date: DateKey) -> Document {
    let mut doc = Document::new();
    doc.insert(FIELD_YEAR.into(), Value::from(date.year));
    doc.insert(FIELD_MONTH.into(), Value::from(date.month));
    doc.insert(FIELD_DAY.into(), Value::from(date.day));
    doc
}

fn decode_date(fields: &Document) -> DateKey {
    let int = |name: &str| fields.get(name).and_then(Value::as_i64);

    if let (Some(year), Some(month), Some(day)) = (int(FIELD_YEAR), int(FIELD_MONTH), int(FIELD_DAY))
    {
        if let (Ok(year), Ok(month), Ok(day)) =
            (i32::try_from(year), u32::try_from(month), u32::try_from(day))
        {
            let date = DateKey::new(year, month, day);
            if date.to_naive_date().is_some() {
                return date;
            }
        }
    }

    fields
        .get(LEGACY_FIELD_DATE)
        .and_then(decode_legacy_date)
        .unwrap_or(DateKey::EPOCH)
}

// The old schema stored either an RFC 3339 timestamp, a plain day, or
// seconds since the Unix epoch.
fn decode_legacy_date(value: &Value) -> Option<DateKey> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| DateKey::from_datetime(dt.with_timezone(&Utc)))
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(DateKey::from)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateKey::from_timestamp),
        _ => None,
    }
}
