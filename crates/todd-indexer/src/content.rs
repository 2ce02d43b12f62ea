//! Embedding text for a changed row.

use serde_json::Value;
use todd_store::{EntityKind, FieldMap};

/// Render a field value as embedding text.
///
/// Strings pass through, `null` becomes empty, everything else is compact JSON.
pub fn stringify_structured(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Build the text to embed for a row of `kind`.
///
/// Empty parts are dropped and the rest joined with newlines. An empty result
/// means there is nothing worth embedding.
pub fn build_content(kind: EntityKind, fields: &FieldMap) -> String {
    let field = |name: &str| fields.get(name).map(stringify_structured).unwrap_or_default();

    let parts = match kind {
        EntityKind::Log => vec![field("message"), field("metadata")],
        EntityKind::Node => vec![field("label"), field("properties")],
        EntityKind::Edge => {
            let source = field("source_id");
            let target = field("target_id");
            let endpoints = if source.is_empty() || target.is_empty() {
                String::new()
            } else {
                format!("edge:{}->{}", source, target)
            };
            vec![field("label"), endpoints, field("properties")]
        }
        EntityKind::KeyValue => vec![field("key"), field("value")],
    };

    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
