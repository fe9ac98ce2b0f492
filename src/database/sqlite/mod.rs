use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::Result;
use crate::catalog::models::{CanonicalItem, RelationBundle};


pub mod models;
pub mod queries;

pub use models::{
    EMBEDDINGS_TABLE, EmbeddingRow, GAMES_TABLE, GameKey, GameRow, MediaScoreRow, PriceRow,
    RelationKind, ReviewRow,
};
pub use queries::{EmbeddingQueries, GameQueries, RelationQueries, SchemaQueries};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    /// Open a database file as it is, without creating it or migrating it
    #[inline]
    pub async fn open_existing<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(false)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open existing database")?;

        Ok(Self { pool })
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("catalog.db")).await
    }

    #[inline]
    pub async fn capabilities(&self) -> Result<CapabilitySet> {
        CapabilitySet::detect(&self.pool).await
    }

    /// Load a stored game and whatever relation rows the schema holds for it
    #[inline]
    pub async fn load_game(
        &self,
        external_id: i64,
        capabilities: &CapabilitySet,
    ) -> Result<Option<(GameRow, RelationBundle)>> {
        let Some(row) = GameQueries::get_by_external_id(&self.pool, external_id).await? else {
            return Ok(None);
        };

        let mut relations = RelationBundle::default();
        if capabilities.supports(RelationKind::RankMembership) {
            relations.rank_ids = RelationQueries::rank_ids_for_game(&self.pool, row.id).await?;
        }
        if capabilities.supports(RelationKind::Price) {
            relations.price_quotes = RelationQueries::prices_for_game(&self.pool, row.id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
        }
        if capabilities.supports(RelationKind::MediaScore) {
            relations.media_scores = RelationQueries::media_scores_for_game(&self.pool, row.id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
        }
        if capabilities.supports(RelationKind::Review) {
            relations.reviews = RelationQueries::reviews_for_game(&self.pool, row.id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
        }

        Ok(Some((row, relations)))
    }

    /// Same as `load_game`, returning the canonical item without row metadata
    #[inline]
    pub async fn load_item(
        &self,
        external_id: i64,
        capabilities: &CapabilitySet,
    ) -> Result<Option<(CanonicalItem, RelationBundle)>> {
        Ok(self
            .load_game(external_id, capabilities)
            .await?
            .map(|(row, relations)| (row.into_item(), relations)))
    }
}

/// Which optional tables exist in the connected database.
///
/// Computed once per run; relation writes and reads consult it instead of
/// probing the schema per item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    tables: HashSet<String>,
}

impl CapabilitySet {
    #[inline]
    pub async fn detect(pool: &DbPool) -> Result<Self> {
        let tables = SchemaQueries::list_tables(pool).await?;
        Ok(Self::from_tables(tables))
    }

    #[inline]
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    #[inline]
    pub fn supports(&self, kind: RelationKind) -> bool {
        self.has_table(kind.table_name())
    }

    /// Relation kinds whose table is absent
    #[inline]
    pub fn missing_relations(&self) -> Vec<RelationKind> {
        RelationKind::ALL
            .into_iter()
            .filter(|kind| !self.supports(*kind))
            .collect()
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        !self.missing_relations().is_empty()
    }
}
