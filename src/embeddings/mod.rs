// Embeddings module
// Builds embedding text for stored games and writes vectors from an embedding model

pub mod ollama;


use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::catalog::extract_embedding_text;
use crate::database::sqlite::{
    CapabilitySet, Database, EMBEDDINGS_TABLE, EmbeddingQueries, GameKey, GameQueries,
};
use crate::{IngestError, Result};

pub use ollama::{ModelInfo, OllamaClient};

/// Turns text into a vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name stored next to each vector
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reject vectors whose length differs from the configured dimension
#[inline]
pub fn validate_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(IngestError::Embedding(format!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected,
            vector.len()
        )))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingStats {
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Writes one `game_embeddings` row per stored game
pub struct EmbeddingPipeline<'a, E: Embedder + ?Sized> {
    database: &'a Database,
    embedder: &'a E,
    capabilities: CapabilitySet,
    expected_dimension: usize,
    max_reviews: usize,
}

impl<'a, E: Embedder + ?Sized> EmbeddingPipeline<'a, E> {
    /// Fails with `IngestError::Configuration` when the store has no
    /// embeddings table.
    #[inline]
    pub async fn new(
        database: &'a Database,
        embedder: &'a E,
        expected_dimension: usize,
        max_reviews: usize,
    ) -> Result<Self> {
        let capabilities = database.capabilities().await?;
        if !capabilities.has_table(EMBEDDINGS_TABLE) {
            return Err(IngestError::Configuration(format!(
                "Table {} is missing; run migrations first",
                EMBEDDINGS_TABLE
            )));
        }

        Ok(Self {
            database,
            embedder,
            capabilities,
            expected_dimension,
            max_reviews,
        })
    }

    /// Games still lacking a vector, or every game when `all` is set
    #[inline]
    pub async fn pending_games(&self, all: bool, limit: Option<i64>) -> Result<Vec<GameKey>> {
        let pool = self.database.pool();
        if all {
            GameQueries::list_keys(pool, limit).await
        } else {
            EmbeddingQueries::games_without_embedding(pool, limit).await
        }
    }

    /// Embed each game in turn; failures are logged and counted
    #[inline]
    pub async fn embed_games(&self, keys: &[GameKey]) -> EmbeddingStats {
        let mut stats = EmbeddingStats::default();
        info!("Embedding {} games with {}", keys.len(), self.embedder.model());

        for key in keys {
            match self.embed_game(key).await {
                Ok(true) => stats.embedded += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    error!("Failed to embed game {}: {}", key.external_id, e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            "Embedded {} games ({} skipped, {} failed)",
            stats.embedded, stats.skipped, stats.failed
        );
        stats
    }

    /// Returns `false` when the game disappeared from the store
    #[inline]
    pub async fn embed_game(&self, key: &GameKey) -> Result<bool> {
        let Some((item, relations)) = self
            .database
            .load_item(key.external_id, &self.capabilities)
            .await?
        else {
            warn!("Game {} no longer stored, skipping", key.external_id);
            return Ok(false);
        };

        let text = extract_embedding_text(&item, &relations, self.max_reviews);
        let vector = self.embedder.embed(&text).await?;
        validate_dimension(&vector, self.expected_dimension)?;

        EmbeddingQueries::upsert(
            self.database.pool(),
            key.id,
            self.embedder.model(),
            &vector,
            &text,
            Utc::now().naive_utc(),
        )
        .await?;

        debug!(
            "Stored {}-dimension embedding for game {}",
            vector.len(),
            key.external_id
        );
        Ok(true)
    }
}
