//! Vector side effects for committed mutations.
//!
//! [`VectorIndexer`] runs after the primary write has finished. It classifies
//! the mutation, builds the embedding text, asks the embedder for a vector and
//! stores it. Failures at any stage are logged and reported back as a warning;
//! they never reach the caller as an error and never undo the primary write.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};
use todd_embed::SharedEmbedder;
use todd_store::{ChangeFeed, ChangeOp, EntityRef, ExecutionResult, RowChange, sql};

use crate::classifier::StatementClassifier;
use crate::content::build_content;
use crate::error::Result;
use crate::shapes::ShapeRegistry;
use crate::sink::SharedSink;

/// What a side effect did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideEffectOutcome {
    pub vectors_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SideEffectOutcome {
    /// Nothing to index.
    pub fn skipped() -> Self {
        Self::default()
    }

    /// A vector was written.
    pub fn updated() -> Self {
        Self {
            vectors_updated: true,
            warning: None,
        }
    }

    /// Indexing was attempted and failed.
    pub fn failed(warning: impl Into<String>) -> Self {
        Self {
            vectors_updated: false,
            warning: Some(warning.into()),
        }
    }
}

/// Totals for a batch of changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
}

impl IndexStats {
    fn record(&mut self, outcome: &SideEffectOutcome) {
        self.processed += 1;
        if outcome.vectors_updated {
            self.updated += 1;
        }
        if outcome.warning.is_some() {
            self.failed += 1;
        }
    }
}

/// Computes and stores vectors for changed rows.
///
/// Cheap to clone; clones share the embedder and sink.
#[derive(Clone)]
pub struct VectorIndexer {
    embedder: SharedEmbedder,
    sink: SharedSink,
    classifier: Arc<StatementClassifier>,
}

impl VectorIndexer {
    /// Create an indexer using the standard statement shapes.
    ///
    /// Fails if the shapes disagree with the store's canonical statements.
    pub fn new(embedder: SharedEmbedder, sink: SharedSink) -> Result<Self> {
        Self::with_registry(embedder, sink, ShapeRegistry::standard(), sql::INDEXED_MUTATIONS)
    }

    /// Create an indexer with a custom registry, validated against `statements`.
    pub fn with_registry(
        embedder: SharedEmbedder,
        sink: SharedSink,
        registry: ShapeRegistry,
        statements: &[&str],
    ) -> Result<Self> {
        registry.validate(statements)?;

        tracing::debug!(
            embedder = embedder.name(),
            model = embedder.model(),
            "Vector indexer ready"
        );

        Ok(Self {
            embedder,
            sink,
            classifier: Arc::new(StatementClassifier::new(registry)),
        })
    }

    pub fn classifier(&self) -> &StatementClassifier {
        &self.classifier
    }

    /// Index the row written by an executed statement.
    pub async fn on_mutation_executed(
        &self,
        sql: &str,
        params: &[Value],
        result: &ExecutionResult,
    ) -> SideEffectOutcome {
        match self.classifier.classify(sql, params, result) {
            Some(change) => self.index(&change).await,
            None => {
                tracing::debug!(rows_affected = result.rows_affected, "Statement not indexed");
                SideEffectOutcome::skipped()
            }
        }
    }

    /// Index a typed row change. Deletes are not indexed.
    pub async fn on_row_changed(&self, change: &RowChange) -> SideEffectOutcome {
        if change.op == ChangeOp::Delete {
            tracing::debug!(entity = %change.entity, "Delete leaves vector in place");
            return SideEffectOutcome::skipped();
        }
        self.index(change).await
    }

    /// Index `change` on a background task.
    pub fn spawn(&self, change: RowChange) -> JoinHandle<SideEffectOutcome> {
        let indexer = self.clone();
        tokio::spawn(async move { indexer.on_row_changed(&change).await })
    }

    /// Index a batch of changes concurrently.
    ///
    /// No ordering is guaranteed between changes.
    pub async fn process_all(&self, changes: impl IntoIterator<Item = RowChange>) -> IndexStats {
        let mut tasks = JoinSet::new();
        for change in changes {
            let indexer = self.clone();
            tasks.spawn(async move { indexer.on_row_changed(&change).await });
        }

        let mut stats = IndexStats::default();
        while let Some(joined) = tasks.join_next().await {
            collect(&mut stats, joined);
        }
        stats
    }

    /// Index every change arriving on `feed` until it closes.
    pub async fn run_feed(&self, mut feed: ChangeFeed) -> IndexStats {
        let mut tasks = JoinSet::new();
        let mut stats = IndexStats::default();

        while let Some(change) = feed.recv().await {
            let indexer = self.clone();
            tasks.spawn(async move { indexer.on_row_changed(&change).await });

            while let Some(joined) = tasks.try_join_next() {
                collect(&mut stats, joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            collect(&mut stats, joined);
        }

        tracing::info!(
            processed = stats.processed,
            updated = stats.updated,
            failed = stats.failed,
            "Change feed closed"
        );
        stats
    }

    async fn index(&self, change: &RowChange) -> SideEffectOutcome {
        let entity = &change.entity;
        let content = build_content(entity.kind, &change.fields);
        if content.is_empty() {
            tracing::debug!(entity = %entity, "No content to embed");
            return SideEffectOutcome::skipped();
        }

        match self.embed_and_store(entity, &content).await {
            Ok(()) => {
                tracing::debug!(entity = %entity, "Vector updated");
                SideEffectOutcome::updated()
            }
            Err(e) => {
                tracing::warn!(entity = %entity, error = %e, "Vector side effect failed");
                SideEffectOutcome::failed(format!("Vector update failed for {}: {}", entity, e))
            }
        }
    }

    async fn embed_and_store(&self, entity: &EntityRef, content: &str) -> Result<()> {
        let embedding = self.embedder.embed(content).await?;
        self.sink.upsert(entity, &embedding.vector).await
    }
}

fn collect(
    stats: &mut IndexStats,
    joined: std::result::Result<SideEffectOutcome, tokio::task::JoinError>,
) {
    match joined {
        Ok(outcome) => stats.record(&outcome),
        Err(e) => {
            tracing::warn!(error = %e, "Indexing task failed");
            stats.record(&SideEffectOutcome::failed(e.to_string()));
        }
    }
}
