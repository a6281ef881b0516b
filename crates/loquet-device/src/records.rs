//! Versioned record decoding.
//!
//! Records stored on the device arrive as a chain of revision-tagged update
//! blocks per record id. [`RecordStore`] folds each block onto the record's
//! current in-memory state:
//!
//! - revision 0 or 1 on a fresh id constructs the record from the block
//! - revision 0 or 1 on a known id mutates the stored record in place, so
//!   the record keeps its identity across revisions
//! - any other revision invalidates the record — the store drops it and
//!   reports "no entry", never a partially-updated object
//!
//! Records are keyed by id in the store rather than handed out as raw
//! pointers; callers hold the id and look the record up, which preserves
//! the same-identity semantics without aliasing hazards.
//!
//! # Block Layout
//!
//! A block is a flat field sequence:
//!
//! ```text
//! repeat { name_len: u8 | name (UTF-8) | value_len: u16 LE | value (UTF-8) }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Stable identifier of a stored record.
pub type RecordId = u32;

/// One named text field of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericField {
    /// Canonical (lowercased, trimmed) field name.
    pub name: String,
    /// Field value, stored verbatim.
    pub value: String,
}

impl GenericField {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A decoded record — the materialized current state of one id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Store id, or `None` for an ad hoc record that has not been stored.
    pub id: Option<RecordId>,
    /// Current fields, in block order.
    pub fields: Vec<GenericField>,
}

impl Record {
    /// Look up a field value by name, case-insensitively.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.fields
            .iter()
            .find(|f| f.name == wanted)
            .map(|f| f.value.as_str())
    }

    /// Build a record ad hoc from a structured field list, independent of
    /// the block-decoding path. Used by import and matching workflows.
    ///
    /// Names are trimmed and lowercased; with `alias_match`, common import
    /// spellings fold onto their canonical names. Duplicate names after
    /// normalization keep the last value. The record carries no id until
    /// the caller stores it.
    #[must_use]
    pub fn from_fields(fields: &[GenericField], alias_match: bool) -> Self {
        let mut normalized: Vec<GenericField> = Vec::with_capacity(fields.len());
        for field in fields {
            let name = canonical_name(&field.name, alias_match);
            if name.is_empty() {
                continue;
            }
            if let Some(existing) = normalized.iter_mut().find(|f| f.name == name) {
                existing.value = field.value.clone();
            } else {
                normalized.push(GenericField {
                    name,
                    value: field.value.clone(),
                });
            }
        }
        Self {
            id: None,
            fields: normalized,
        }
    }
}

/// Alias table for import matching: alternate spelling → canonical name.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("user", "username"),
    ("login", "username"),
    ("pass", "password"),
    ("url", "website"),
    ("site", "website"),
    ("note", "notes"),
];

fn canonical_name(raw: &str, alias_match: bool) -> String {
    let lowered = raw.trim().to_lowercase();
    if alias_match {
        if let Some((_, canonical)) = FIELD_ALIASES.iter().find(|(alias, _)| *alias == lowered) {
            return (*canonical).to_string();
        }
    }
    lowered
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory arena of decoded records, keyed by id.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<RecordId, Record>,
}

impl RecordStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one revision-tagged block onto the record with this id.
    ///
    /// Returns the record's new state, or `Ok(None)` when the revision is
    /// unrecognized — the record is then dropped from the store and the
    /// caller must treat it as deleted, not retry.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::RecordFormat`] if the block bytes are
    /// malformed; the previous state of the id is left untouched.
    pub fn decode_block(
        &mut self,
        id: RecordId,
        revision: u8,
        block: &[u8],
    ) -> Result<Option<&Record>, DeviceError> {
        match revision {
            0 | 1 => {
                // Parse fully before touching the stored record, so a bad
                // block never leaves a half-applied state behind.
                let fields = parse_block(block)?;
                let record = self.records.entry(id).or_insert_with(|| Record {
                    id: Some(id),
                    fields: Vec::new(),
                });
                record.fields = fields;
                Ok(Some(record))
            }
            other => {
                tracing::warn!(id, revision = other, "unrecognized record revision, dropping");
                self.records.remove(&id);
                Ok(None)
            }
        }
    }

    /// Current state of a record, if present.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if no records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Block codec
// ---------------------------------------------------------------------------

fn parse_block(block: &[u8]) -> Result<Vec<GenericField>, DeviceError> {
    let mut fields = Vec::new();
    let mut cursor = 0usize;

    while cursor < block.len() {
        let name_len = usize::from(read_u8(block, &mut cursor)?);
        if name_len == 0 {
            return Err(DeviceError::RecordFormat("empty field name".into()));
        }
        let name = read_text(block, &mut cursor, name_len)?;
        let value_len = usize::from(read_u16_le(block, &mut cursor)?);
        let value = read_text(block, &mut cursor, value_len)?;
        fields.push(GenericField {
            name: name.trim().to_lowercase(),
            value,
        });
    }

    Ok(fields)
}

/// Compose a block from a field list — the write-side counterpart used by
/// the storage-sync layer when pushing a record back to the device.
///
/// # Errors
///
/// Returns [`DeviceError::RecordFormat`] if a field name is empty or a
/// name/value exceeds its length prefix.
pub fn encode_block(fields: &[GenericField]) -> Result<Vec<u8>, DeviceError> {
    let mut out = Vec::new();
    for field in fields {
        let name = field.name.as_bytes();
        let value = field.value.as_bytes();
        if name.is_empty() {
            return Err(DeviceError::RecordFormat("empty field name".into()));
        }
        let name_len = u8::try_from(name.len()).map_err(|_| {
            DeviceError::RecordFormat(format!("field name too long: {} bytes", name.len()))
        })?;
        let value_len = u16::try_from(value.len()).map_err(|_| {
            DeviceError::RecordFormat(format!("field value too long: {} bytes", value.len()))
        })?;
        out.push(name_len);
        out.extend_from_slice(name);
        out.extend_from_slice(&value_len.to_le_bytes());
        out.extend_from_slice(value);
    }
    Ok(out)
}

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, DeviceError> {
    let byte = data
        .get(*cursor)
        .copied()
        .ok_or_else(|| DeviceError::RecordFormat("block truncated reading u8".into()))?;
    *cursor = cursor.saturating_add(1);
    Ok(byte)
}

fn read_u16_le(data: &[u8], cursor: &mut usize) -> Result<u16, DeviceError> {
    let end = cursor
        .checked_add(2)
        .ok_or_else(|| DeviceError::RecordFormat("length offset overflow".into()))?;
    let bytes: [u8; 2] = data
        .get(*cursor..end)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| DeviceError::RecordFormat("block truncated reading u16".into()))?;
    *cursor = end;
    Ok(u16::from_le_bytes(bytes))
}

fn read_text(data: &[u8], cursor: &mut usize, len: usize) -> Result<String, DeviceError> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| DeviceError::RecordFormat("field offset overflow".into()))?;
    let bytes = data
        .get(*cursor..end)
        .ok_or_else(|| DeviceError::RecordFormat("block truncated reading field".into()))?;
    *cursor = end;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| DeviceError::RecordFormat("field is not valid UTF-8".into()))
}

// ---------------------------------------------------------------------------
// Unit tests — revision semantics live in tests/record_decoding.rs
// ---------------------------------------------------------------------------
