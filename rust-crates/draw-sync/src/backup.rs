//! Portable backup documents.
//!
//! A backup is the whole [`AppState`] as pretty-printed JSON. Decoding is
//! structural only; [`decode_for_import`] additionally runs the integrity
//! check a document must pass before it may replace the live one.

use crate::{
    integrity::IntegrityError,
    state::AppState,
};
use anyhow::Context;

const REQUIRED_COLLECTIONS: [&str; 2] = ["participants", "prizes"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupError {
    #[error("invalid backup document: {0}")]
    Invalid(String),
    #[error("backup document is inconsistent: {0}")]
    Inconsistent(#[from] IntegrityError),
}

pub fn encode(state: &AppState) -> crate::Result<String> {
    serde_json::to_string_pretty(state).context("serialize backup document")
}

pub fn decode(text: &str) -> Result<AppState, BackupError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| BackupError::Invalid(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| BackupError::Invalid("expected a JSON object".to_string()))?;
    for field in REQUIRED_COLLECTIONS {
        match object.get(field) {
            Some(serde_json::Value::Array(_)) => {}
            Some(_) => {
                return Err(BackupError::Invalid(format!(
                    "field `{field}` must be a list"
                )));
            }
            None => {
                return Err(BackupError::Invalid(format!("missing field `{field}`")));
            }
        }
    }
    serde_json::from_value(value).map_err(|e| BackupError::Invalid(e.to_string()))
}

/// Decodes a backup and rejects it unless every document invariant holds.
pub fn decode_for_import(text: &str) -> Result<AppState, BackupError> {
    let state = decode(text)?;
    state.check_integrity()?;
    Ok(state)
}
