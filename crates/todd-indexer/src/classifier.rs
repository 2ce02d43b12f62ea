//! Recognizes raw SQL mutations and turns them into row changes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use todd_store::{ChangeOp, EntityId, EntityRef, ExecutionResult, FieldMap, RowChange};

use crate::shapes::{IdRule, ShapeRegistry, StatementShape};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Collapse whitespace runs, trim and lower-case.
pub fn normalize_sql(sql: &str) -> String {
    WHITESPACE.replace_all(sql, " ").trim().to_lowercase()
}

/// Classifies executed statements against a [`ShapeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct StatementClassifier {
    registry: ShapeRegistry,
}

impl StatementClassifier {
    pub fn new(registry: ShapeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    /// Work out which row a statement wrote and with which field values.
    ///
    /// Returns `None` for anything not worth indexing: statements that
    /// touched no row, statements no shape recognizes, inserts without a
    /// generated id and updates without an id parameter.
    pub fn classify(
        &self,
        sql: &str,
        params: &[Value],
        result: &ExecutionResult,
    ) -> Option<RowChange> {
        let normalized = normalize_sql(sql);
        let shape = self.registry.find(&normalized)?;

        if result.rows_affected == 0 {
            tracing::debug!(shape = shape.prefix, "Statement touched no rows, skipping");
            return None;
        }

        let Some(id) = resolve_id(shape, params, result) else {
            tracing::debug!(
                shape = shape.prefix,
                kind = %shape.kind,
                "Statement has no usable row id, skipping"
            );
            return None;
        };

        let fields: FieldMap = shape
            .fields
            .iter()
            .map(|(name, position)| {
                let value = params.get(*position).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect();

        let op = if shape.prefix.starts_with("insert") {
            ChangeOp::Insert
        } else {
            ChangeOp::Update
        };

        Some(RowChange {
            entity: EntityRef::new(shape.kind, id),
            op,
            fields,
        })
    }
}

/// Classify with the standard shapes.
pub fn classify(sql: &str, params: &[Value], result: &ExecutionResult) -> Option<RowChange> {
    StatementClassifier::default().classify(sql, params, result)
}

fn resolve_id(shape: &StatementShape, params: &[Value], result: &ExecutionResult) -> Option<EntityId> {
    match shape.id {
        IdRule::InsertedRowId => result.inserted_id.map(EntityId::Int),
        IdRule::Param(position) => params.get(position).and_then(EntityId::from_value),
    }
}
