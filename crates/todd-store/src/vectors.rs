//! The `vectors` side table.

use chrono::{SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::changes::{EntityId, EntityKind, EntityRef};
use crate::database::{Database, Result, StoreError};
use crate::sql;

/// A stored embedding for one logical row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub entity: EntityRef,
    pub vector: Vec<f32>,
    pub created_at: String,
}

impl Database {
    /// Insert or replace the vector for `entity`, refreshing its timestamp.
    pub fn upsert_vector(&self, entity: &EntityRef, vector: &[f32]) -> Result<()> {
        let payload = serde_json::to_string(vector)?;
        let created_at = now_utc_string();

        self.with_connection(|conn| {
            conn.execute(
                sql::UPSERT_VECTOR,
                params![
                    entity.kind.as_str(),
                    entity.id.to_string(),
                    payload,
                    created_at
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(entity = %entity, dimensions = vector.len(), "Vector upserted");
        Ok(())
    }

    /// Fetch the vector for `entity`, if one exists.
    pub fn get_vector(&self, entity: &EntityRef) -> Result<Option<VectorRecord>> {
        let row = self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT vector, created_at FROM vectors WHERE item_type = ?1 AND item_id = ?2",
                    params![entity.kind.as_str(), entity.id.to_string()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?)
        })?;

        row.map(|(vector, created_at)| {
            Ok(VectorRecord {
                entity: entity.clone(),
                vector: serde_json::from_str(&vector)?,
                created_at,
            })
        })
        .transpose()
    }

    /// List stored vectors, optionally restricted to one kind.
    pub fn list_vectors(&self, kind: Option<EntityKind>) -> Result<Vec<VectorRecord>> {
        let rows: Vec<(String, String, String, String)> = self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT item_type, item_id, vector, created_at FROM vectors
                 WHERE ?1 IS NULL OR item_type = ?1
                 ORDER BY item_type ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(params![kind.map(EntityKind::as_str)], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(item_type, item_id, vector, created_at)| {
                let kind = item_type
                    .parse::<EntityKind>()
                    .map_err(StoreError::InvalidData)?;
                Ok(VectorRecord {
                    entity: EntityRef::new(kind, parse_item_id(kind, item_id)),
                    vector: serde_json::from_str(&vector)?,
                    created_at,
                })
            })
            .collect()
    }

    /// Number of stored vectors.
    pub fn count_vectors(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Delete vectors whose row no longer exists in its primary table.
    ///
    /// Deletes never remove vectors on their own; this is the explicit cleanup.
    pub fn prune_orphaned_vectors(&self) -> Result<usize> {
        let removed = self.transaction(|conn| {
            let mut removed = 0;
            for kind in EntityKind::ALL {
                let statement = format!(
                    "DELETE FROM vectors WHERE item_type = ?1 AND NOT EXISTS (
                        SELECT 1 FROM {table} WHERE CAST({table}.{key} AS TEXT) = vectors.item_id
                    )",
                    table = kind.table(),
                    key = kind.key_column(),
                );
                removed += conn.execute(&statement, params![kind.as_str()])?;
            }
            Ok(removed)
        })?;

        tracing::info!(removed, "Pruned orphaned vectors");
        Ok(removed)
    }
}

fn parse_item_id(kind: EntityKind, item_id: String) -> EntityId {
    match kind {
        EntityKind::KeyValue => EntityId::Text(item_id),
        _ => item_id
            .parse::<i64>()
            .map(EntityId::Int)
            .unwrap_or(EntityId::Text(item_id)),
    }
}

fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
