use crate::archiver::tags::TagLookup;
use crate::archiver::util::sheet_time_from_rfc3339;
use crate::error::ArchiverError;
use crate::helpdesk::RawConversation;
use crate::sheets::{CellValue, RowCells};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

pub const COL_ID: &str = "id";
pub const COL_CHANNEL: &str = "channel";
pub const COL_MESSAGE_COUNT: &str = "messageCount";
pub const COL_CREATED_AT: &str = "createdAt";
pub const COL_ENDED_AT: &str = "endedAt";
pub const COL_TAGS: &str = "tags";
pub const COL_DELETED_AT: &str = "deletedAt";
pub const COL_DEVICE: &str = "device";
pub const COL_REASON: &str = "reasonForSupport";
pub const COL_CHAIN: &str = "fromWhichChain";
pub const COL_ASSETS: &str = "whichAssets";
pub const COL_POOL: &str = "poolOrPairing";

/// Columns a tag name may never claim as its boolean column.
const RESERVED_COLUMNS: [&str; 12] = [
    COL_ID,
    COL_CHANNEL,
    COL_MESSAGE_COUNT,
    COL_CREATED_AT,
    COL_ENDED_AT,
    COL_TAGS,
    COL_DELETED_AT,
    COL_DEVICE,
    COL_REASON,
    COL_CHAIN,
    COL_ASSETS,
    COL_POOL,
];

/// Flat, sparse row: column name → scalar, remembering the order columns
/// were first set so new header columns can be appended deterministically.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    id: String,
    columns: Vec<String>,
    cells: RowCells,
}

impl NormalizedRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut record = Self {
            id: id.clone(),
            columns: Vec::new(),
            cells: RowCells::new(),
        };
        record.set(COL_ID, CellValue::Text(id));
        record
    }

    pub fn set(&mut self, column: &str, value: CellValue) {
        if !self.cells.contains_key(column) {
            self.columns.push(column.to_string());
        }
        self.cells.insert(column.to_string(), value);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Column names in first-set order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    pub fn cells(&self) -> &RowCells {
        &self.cells
    }
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    pub skipped: Vec<ArchiverError>,
    pub duplicates: usize,
}

fn required_time(id: &str, field: &str, raw: Option<&str>) -> Result<String, ArchiverError> {
    let raw = raw.ok_or_else(|| ArchiverError::malformed(id, format!("missing {field}")))?;
    sheet_time_from_rfc3339(raw)
        .ok_or_else(|| ArchiverError::malformed(id, format!("invalid {field} `{raw}`")))
}

fn resolved_tag_names<'a>(tag_ids: &[String], lookup: &'a TagLookup) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag_id in tag_ids {
        match lookup.name(tag_id) {
            Some("") => {}
            Some(name) => {
                if seen.insert(name) {
                    out.push(name);
                }
            }
            None => debug!(tag_id = %tag_id, "tag id missing from lookup"),
        }
    }
    out
}

/// Convert one raw search result into a sheet row.
pub fn normalize(raw: &Value, lookup: &TagLookup) -> Result<NormalizedRecord, ArchiverError> {
    let id_hint = raw.get("id").and_then(Value::as_str).unwrap_or_default();
    let conv = RawConversation::deserialize(raw)
        .map_err(|err| ArchiverError::malformed(id_hint, err.to_string()))?;
    if conv.id.trim().is_empty() {
        return Err(ArchiverError::malformed("", "missing id"));
    }
    let id = conv.id.as_str();
    let attrs = &conv.attributes;

    let channel = attrs
        .channels
        .as_deref()
        .and_then(<[String]>::first)
        .ok_or_else(|| ArchiverError::malformed(id, "no channel"))?;
    let message_count = attrs
        .message_count
        .ok_or_else(|| ArchiverError::malformed(id, "missing messageCount"))?;
    let created_at = required_time(id, "createdAt", attrs.created_at.as_deref())?;
    let ended_at = required_time(id, "endedAt", attrs.ended_at.as_deref())?;

    let mut record = NormalizedRecord::new(id);
    record.set(COL_CHANNEL, CellValue::from(channel.as_str()));
    record.set(COL_MESSAGE_COUNT, CellValue::Number(message_count));
    record.set(COL_CREATED_AT, CellValue::Text(created_at));
    record.set(COL_ENDED_AT, CellValue::Text(ended_at));

    if let Some(custom) = &attrs.custom {
        let fields = [
            (COL_DEVICE, &custom.device_str),
            (COL_REASON, &custom.reason_for_support_str),
            (COL_CHAIN, &custom.from_which_chain_str),
            (COL_ASSETS, &custom.which_assets_str),
            (COL_POOL, &custom.pool_or_pairing_str),
        ];
        for (column, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                record.set(column, CellValue::from(value));
            }
        }
    }

    let names = resolved_tag_names(attrs.tags.as_deref().unwrap_or_default(), lookup);
    if !names.is_empty() {
        record.set(COL_TAGS, CellValue::Text(names.join(",")));
    }
    for name in names {
        if RESERVED_COLUMNS.contains(&name) {
            debug!(id, tag = name, "tag name collides with a fixed column");
            continue;
        }
        record.set(name, CellValue::Bool(true));
    }

    Ok(record)
}

/// Normalize a whole search page. Malformed records are logged and skipped;
/// a repeated id keeps its first occurrence.
pub fn normalize_batch(raws: &[Value], lookup: &TagLookup) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    let mut seen = HashSet::new();
    for raw in raws {
        match normalize(raw, lookup) {
            Ok(record) => {
                if seen.insert(record.id().to_string()) {
                    batch.records.push(record);
                } else {
                    warn!(id = record.id(), "duplicate conversation in search results");
                    batch.duplicates += 1;
                }
            }
            Err(err) => {
                warn!(stage = "normalize", "skipping record: {err}");
                batch.skipped.push(err);
            }
        }
    }
    batch
}
