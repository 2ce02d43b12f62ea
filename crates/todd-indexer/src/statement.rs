//! One-shot statement execution with vector side effects.

use serde::Serialize;
use serde_json::Value;
use todd_store::{Database, Row};

use crate::orchestrator::VectorIndexer;

/// Reply for a single executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Vec<Row>,
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<i64>,
    pub vectors_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl StatementResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Execute `sql` against `db` and, for writes, run the vector side effect.
///
/// Statement errors are reported in the response rather than returned. A
/// failed side effect leaves the write in place and sets `warning`.
pub async fn run_statement(
    db: &Database,
    indexer: Option<&VectorIndexer>,
    sql: &str,
    params: &[Value],
) -> StatementResponse {
    let output = {
        let db = db.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || db.run(&sql, &params)).await
    };

    let output = match output {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Statement failed");
            return StatementResponse::failure(e.to_string());
        }
        Err(e) => return StatementResponse::failure(format!("Statement task failed: {}", e)),
    };

    let mut response = StatementResponse {
        success: true,
        data: output.rows,
        rows_affected: output.result.rows_affected,
        inserted_id: output.result.inserted_id,
        ..StatementResponse::default()
    };

    if output.read_only {
        return response;
    }

    if let Some(indexer) = indexer {
        let outcome = indexer
            .on_mutation_executed(sql, params, &output.result)
            .await;
        response.vectors_updated = outcome.vectors_updated;
        response.warning = outcome.warning;
    }

    response
}
