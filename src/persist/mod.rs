// Persistence engine
// Upserts canonical items and reconciles their relation tables

#[cfg(test)]
mod tests;

use chrono::{NaiveDateTime, Utc};
use itertools::Itertools;
use std::fmt;
use std::ops::AddAssign;
use tracing::{debug, error, warn};

use crate::Result;
use crate::catalog::models::{CanonicalItem, MediaScore, PriceQuote, RelationBundle, ReviewRecord};
use crate::catalog::{clean, merge};
use crate::database::sqlite::{
    CapabilitySet, Database, DbPool, GameQueries, RelationKind, RelationQueries,
};
use crate::orchestrator::PendingItem;

/// Whether an upsert created the primary row or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Relation entries reconciled for one item or accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationCounts {
    pub rank_memberships: usize,
    pub prices: usize,
    pub media_scores: usize,
    pub reviews: usize,
    pub failures: usize,
}

impl RelationCounts {
    #[inline]
    pub fn written(&self) -> usize {
        self.rank_memberships + self.prices + self.media_scores + self.reviews
    }

    fn record_success(&mut self, kind: RelationKind) {
        match kind {
            RelationKind::RankMembership => self.rank_memberships += 1,
            RelationKind::Price => self.prices += 1,
            RelationKind::MediaScore => self.media_scores += 1,
            RelationKind::Review => self.reviews += 1,
        }
    }
}

impl AddAssign for RelationCounts {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.rank_memberships += other.rank_memberships;
        self.prices += other.prices;
        self.media_scores += other.media_scores;
        self.reviews += other.reviews;
        self.failures += other.failures;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistResult {
    pub outcome: UpsertOutcome,
    pub game_id: i64,
    pub relations: RelationCounts,
}

/// Outcome counters of one persisted batch; add up into a run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub relations: RelationCounts,
}

impl BatchStats {
    #[inline]
    pub fn persisted(&self) -> usize {
        self.created + self.updated
    }

    #[inline]
    pub fn record(&mut self, result: &PersistResult) {
        match result.outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
        self.relations += result.relations;
    }
}

impl AddAssign for BatchStats {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
        self.relations += other.relations;
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} failed; relations: {} ranks, {} prices, {} media scores, {} reviews, {} failed",
            self.created,
            self.updated,
            self.failed,
            self.relations.rank_memberships,
            self.relations.prices,
            self.relations.media_scores,
            self.relations.reviews,
            self.relations.failures
        )
    }
}

/// Writes canonical items and their relations into the store.
///
/// The capability set is fixed at construction; relation kinds whose table
/// is missing are skipped for the lifetime of the engine.
#[derive(Debug, Clone)]
pub struct PersistenceEngine {
    pool: DbPool,
    capabilities: CapabilitySet,
}

impl PersistenceEngine {
    #[inline]
    pub async fn new(database: &Database) -> Result<Self> {
        let capabilities = database.capabilities().await?;
        Ok(Self::with_capabilities(database.pool().clone(), capabilities))
    }

    #[inline]
    pub fn with_capabilities(pool: DbPool, capabilities: CapabilitySet) -> Self {
        let missing = capabilities.missing_relations();
        if !missing.is_empty() {
            warn!(
                "Relation tables missing for {}; running in degraded mode and skipping those relations",
                missing.iter().join(", ")
            );
        }

        Self { pool, capabilities }
    }

    #[inline]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Upsert the primary row, then reconcile every supported relation.
    ///
    /// Only a primary row failure is returned as an error. Relation failures
    /// are logged, rolled back and counted in `PersistResult::relations`.
    #[inline]
    pub async fn upsert(
        &self,
        item: &CanonicalItem,
        relations: &RelationBundle,
    ) -> Result<PersistResult> {
        let now = Utc::now().naive_utc();
        let (outcome, game_id) = self.upsert_primary(item, now).await?;
        let relations = self
            .reconcile_relations(game_id, item.external_id, relations, now)
            .await;

        debug!(
            "Persisted game {} as id {} ({:?}, {} relation entries)",
            item.external_id,
            game_id,
            outcome,
            relations.written()
        );

        Ok(PersistResult {
            outcome,
            game_id,
            relations,
        })
    }

    /// Merge, clean and upsert each fetched item.
    ///
    /// A clean failure or a primary row failure marks the item failed and
    /// skips its relations; relation failures only add to the counters.
    #[inline]
    pub async fn persist_batch(&self, items: &[PendingItem]) -> BatchStats {
        let mut stats = BatchStats::default();

        for pending in items {
            let merged = merge(
                &pending.summary,
                pending.detail.as_ref(),
                pending.scores.as_ref(),
            );

            let cleaned = match clean(merged) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    warn!(
                        "Dropping item {}: {}",
                        display_id(pending.external_id()),
                        e
                    );
                    stats.failed += 1;
                    continue;
                }
            };

            match self.upsert(&cleaned.item, &cleaned.relations).await {
                Ok(result) => stats.record(&result),
                Err(e) => {
                    error!(
                        "Failed to persist game {}: {}",
                        cleaned.item.external_id, e
                    );
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    async fn upsert_primary(
        &self,
        item: &CanonicalItem,
        now: NaiveDateTime,
    ) -> Result<(UpsertOutcome, i64)> {
        let mut tx = self.pool.begin().await?;

        let result = match GameQueries::find_id_by_external_id(&mut tx, item.external_id).await? {
            Some(id) => {
                GameQueries::update(&mut tx, id, item, now).await?;
                (UpsertOutcome::Updated, id)
            }
            None => {
                let id = GameQueries::insert(&mut tx, item, now).await?;
                (UpsertOutcome::Created, id)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn reconcile_relations(
        &self,
        game_id: i64,
        external_id: i64,
        relations: &RelationBundle,
        now: NaiveDateTime,
    ) -> RelationCounts {
        let mut counts = RelationCounts::default();

        if self.capabilities.supports(RelationKind::RankMembership) {
            for rank_id in &relations.rank_ids {
                let outcome = self.write_rank_membership(game_id, *rank_id, now).await;
                tally(
                    &mut counts,
                    external_id,
                    RelationKind::RankMembership,
                    rank_id,
                    outcome,
                );
            }
        }

        if self.capabilities.supports(RelationKind::Price) {
            for quote in &relations.price_quotes {
                let outcome = self.write_price(game_id, quote, now).await;
                tally(
                    &mut counts,
                    external_id,
                    RelationKind::Price,
                    &quote.platform_name,
                    outcome,
                );
            }
        }

        if self.capabilities.supports(RelationKind::MediaScore) {
            for media in &relations.media_scores {
                let outcome = self.write_media_score(game_id, media, now).await;
                tally(
                    &mut counts,
                    external_id,
                    RelationKind::MediaScore,
                    &media.media_name,
                    outcome,
                );
            }
        }

        if self.capabilities.supports(RelationKind::Review) {
            for review in &relations.reviews {
                let outcome = self.write_review(game_id, review, now).await;
                tally(
                    &mut counts,
                    external_id,
                    RelationKind::Review,
                    &review.external_comment_id,
                    outcome,
                );
            }
        }

        counts
    }

    // Each relation entry commits on its own; an early return drops the
    // transaction, which rolls it back. Writers return whether a row changed.

    async fn write_rank_membership(
        &self,
        game_id: i64,
        rank_id: i64,
        now: NaiveDateTime,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if RelationQueries::rank_membership_exists(&mut tx, game_id, rank_id).await? {
            return Ok(false);
        }
        RelationQueries::insert_rank_membership(&mut tx, game_id, rank_id, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn write_price(&self, game_id: i64, quote: &PriceQuote, now: NaiveDateTime) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        match RelationQueries::find_price_id(&mut tx, game_id, &quote.platform_name).await? {
            Some(id) => RelationQueries::update_price(&mut tx, id, quote, now).await?,
            None => RelationQueries::insert_price(&mut tx, game_id, quote, now).await?,
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn write_media_score(
        &self,
        game_id: i64,
        media: &MediaScore,
        now: NaiveDateTime,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        match RelationQueries::find_media_score_id(&mut tx, game_id, &media.media_name).await? {
            Some(id) => RelationQueries::update_media_score(&mut tx, id, media, now).await?,
            None => RelationQueries::insert_media_score(&mut tx, game_id, media, now).await?,
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn write_review(
        &self,
        game_id: i64,
        review: &ReviewRecord,
        now: NaiveDateTime,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        match RelationQueries::find_review_id(&mut tx, review.external_comment_id).await? {
            Some(id) => RelationQueries::update_review(&mut tx, id, game_id, review, now).await?,
            None => RelationQueries::insert_review(&mut tx, game_id, review, now).await?,
        }
        tx.commit().await?;
        Ok(true)
    }
}

fn tally(
    counts: &mut RelationCounts,
    external_id: i64,
    kind: RelationKind,
    sub_key: &dyn fmt::Display,
    outcome: Result<bool>,
) {
    match outcome {
        Ok(true) => counts.record_success(kind),
        Ok(false) => debug!(
            "{} {} for game {} already present",
            kind, sub_key, external_id
        ),
        Err(e) => {
            error!(
                "Failed to write {} {} for game {}: {}",
                kind, sub_key, external_id, e
            );
            counts.failures += 1;
        }
    }
}

fn display_id(external_id: Option<i64>) -> String {
    external_id.map_or_else(|| "<no id>".to_string(), |id| id.to_string())
}
