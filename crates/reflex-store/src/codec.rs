//! Encode/decode pairs for the delimited list and settings fields.
//!
//! The storage layer keeps three string-encoded formats: pipe-joined item
//! id lists, comma-joined handler name lists, and JSON settings objects.
//! Each codec lives here, independent of the stores, so a format change
//! never ripples into business logic.
//!
//! Decoding is forgiving: malformed tokens are dropped with a warning
//! rather than failing the read.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use reflex_core::{FieldChanges, Settings};

/// Settings key under which a trigger's field changes are persisted.
/// Runtime code never sees this key; it is lifted out on decode and
/// re-bundled on encode.
const FIELD_CHANGES_KEY: &str = "fieldChanges";

/// Pipe-join an id list: `[1, 2, 3]` -> `"1|2|3"`.
pub fn encode_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// Decode a pipe-joined id list, dropping malformed tokens.
pub fn decode_ids(raw: &str) -> Vec<i64> {
    raw.split('|')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Dropping malformed id token: {:?}", token);
                None
            }
        })
        .collect()
}

/// Comma-join a handler name list.
pub fn encode_names(names: &[String]) -> String {
    names.join(",")
}

/// Decode a comma-joined handler name list, dropping blank entries.
pub fn decode_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Serialize an action's settings bag as a JSON object.
pub fn encode_settings(settings: &Settings) -> String {
    serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string())
}

/// Decode an action's settings bag. Blank or malformed input yields an
/// empty bag.
pub fn decode_settings(raw: &str) -> Settings {
    let raw = raw.trim();
    if raw.is_empty() || raw == "[]" {
        return Settings::new();
    }
    match serde_json::from_str(raw) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Dropping malformed settings object: {}", e);
            Settings::new()
        }
    }
}

/// Serialize a trigger's per-handler settings, bundling the field-change
/// tokens into the same object under [`FIELD_CHANGES_KEY`].
///
/// Returns the empty string when there is nothing to store.
pub fn encode_trigger_settings(
    settings: &IndexMap<String, Settings>,
    field_changes: &FieldChanges,
) -> String {
    let mut root: IndexMap<String, Value> = IndexMap::new();
    for (handler, bag) in settings {
        match serde_json::to_value(bag) {
            Ok(value) => {
                root.insert(handler.clone(), value);
            }
            Err(e) => warn!("Skipping unserializable settings for {}: {}", handler, e),
        }
    }
    if !field_changes.is_empty() {
        root.insert(
            FIELD_CHANGES_KEY.to_string(),
            Value::from(field_changes.tokens()),
        );
    }
    if root.is_empty() {
        return String::new();
    }
    serde_json::to_string(&root).unwrap_or_default()
}

/// Decode a trigger's settings object, lifting the field-change tokens
/// out into their own value. The returned settings map never contains
/// [`FIELD_CHANGES_KEY`].
pub fn decode_trigger_settings(raw: &str) -> (IndexMap<String, Settings>, FieldChanges) {
    let raw = raw.trim();
    if raw.is_empty() || raw == "[]" {
        return (IndexMap::new(), FieldChanges::default());
    }

    let mut root: IndexMap<String, Value> = match serde_json::from_str(raw) {
        Ok(root) => root,
        Err(e) => {
            warn!("Dropping malformed trigger settings: {}", e);
            return (IndexMap::new(), FieldChanges::default());
        }
    };

    let field_changes = match root.shift_remove(FIELD_CHANGES_KEY) {
        Some(Value::Array(tokens)) => FieldChanges::from_tokens(
            tokens.iter().filter_map(|t| t.as_str().map(str::to_string)),
        ),
        Some(Value::String(tokens)) => FieldChanges::parse(&tokens),
        Some(other) => {
            warn!("Ignoring field changes of unexpected shape: {}", other);
            FieldChanges::default()
        }
        None => FieldChanges::default(),
    };

    let mut settings = IndexMap::new();
    for (handler, value) in root {
        match value {
            Value::Object(bag) => {
                settings.insert(handler, bag.into_iter().collect::<Settings>());
            }
            other => warn!("Ignoring non-object settings for {}: {}", handler, other),
        }
    }

    (settings, field_changes)
}
