//! Destinations for computed vectors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use todd_store::{Database, EntityRef};

use crate::error::{IndexError, Result};

/// Stores one vector per logical row, replacing any previous one.
#[async_trait]
pub trait VectorSink: Send + Sync {
    async fn upsert(&self, entity: &EntityRef, vector: &[f32]) -> Result<()>;
}

/// A sink that can be shared across tasks.
pub type SharedSink = Arc<dyn VectorSink>;

#[async_trait]
impl VectorSink for Database {
    async fn upsert(&self, entity: &EntityRef, vector: &[f32]) -> Result<()> {
        let db = self.clone();
        let entity = entity.clone();
        let vector = vector.to_vec();

        tokio::task::spawn_blocking(move || db.upsert_vector(&entity, &vector)).await??;
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    vectors: Mutex<HashMap<EntityRef, Vec<f32>>>,
    writes: Mutex<usize>,
    fail_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every write with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn get(&self, entity: &EntityRef) -> Option<Vec<f32>> {
        self.vectors.lock().unwrap().get(entity).cloned()
    }

    /// Number of distinct rows holding a vector.
    pub fn len(&self) -> usize {
        self.vectors.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of upserts attempted, including failed ones.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl VectorSink for MemorySink {
    async fn upsert(&self, entity: &EntityRef, vector: &[f32]) -> Result<()> {
        *self.writes.lock().unwrap() += 1;

        if let Some(message) = &self.fail_with {
            return Err(IndexError::Storage(message.clone()));
        }

        self.vectors
            .lock()
            .unwrap()
            .insert(entity.clone(), vector.to_vec());
        Ok(())
    }
}
