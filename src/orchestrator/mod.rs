// Concurrency orchestrator
// Fans detail and score fetches out in bounded batches and hands each batch to a sink

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::catalog::models::{DetailPartial, ScorePartial, SummaryPartial};
use crate::config::Config;
use crate::source::{
    CatalogSource, RankSnapshotStore, parse_detail, parse_scores, parse_summary,
};

/// Upper bound on pages walked per rank, in case upstream ignores `pageIndex`
pub const MAX_PAGES_PER_RANK: u32 = 50;

const PROGRESS_LOG_INTERVAL: usize = 50;

/// One item travelling through the fetch cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingItem {
    pub summary: SummaryPartial,
    pub detail: Option<DetailPartial>,
    pub scores: Option<ScorePartial>,
}

impl PendingItem {
    #[inline]
    pub fn new(summary: SummaryPartial) -> Self {
        Self {
            summary,
            detail: None,
            scores: None,
        }
    }

    #[inline]
    pub fn external_id(&self) -> Option<i64> {
        self.summary.fields.external_id
    }
}

/// Receives every completed batch before the next one starts
#[async_trait]
pub trait BatchSink: Send {
    /// `items` are in input order and cover positions `start..end` of the run
    async fn on_batch_complete(&mut self, items: &[PendingItem], start: usize, end: usize);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub fetched: usize,
    pub skipped: usize,
    pub detail_failures: usize,
    pub score_failures: usize,
    pub batches: usize,
    /// The deadline passed before every batch ran
    pub aborted: bool,
}

impl FetchStats {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Fetched {
                detail_failed,
                scores_failed,
            } => {
                self.fetched += 1;
                self.detail_failures += usize::from(detail_failed);
                self.score_failures += usize::from(scores_failed);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Skipped,
    Fetched {
        detail_failed: bool,
        scores_failed: bool,
    },
}

/// Bounded-parallel detail and score fetcher.
///
/// The semaphore and completion counter live as long as the fetcher, so the
/// bound holds across every batch and every call.
pub struct DetailFetcher<S: CatalogSource + ?Sized> {
    source: Arc<S>,
    semaphore: Arc<Semaphore>,
    completed: AtomicUsize,
    concurrency: usize,
    inter_batch_delay: Duration,
    score_page_size: u32,
    deadline: Option<Instant>,
}

impl<S: CatalogSource + ?Sized> DetailFetcher<S> {
    /// A concurrency of zero is treated as one
    #[inline]
    pub fn new(source: Arc<S>, concurrency: usize, inter_batch_delay: Duration) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            source,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            completed: AtomicUsize::new(0),
            concurrency,
            inter_batch_delay,
            score_page_size: 100,
            deadline: None,
        }
    }

    #[inline]
    pub fn from_config(source: Arc<S>, config: &Config) -> Self {
        Self::new(
            source,
            config.ingest.concurrency,
            Duration::from_millis(config.ingest.inter_batch_delay_ms),
        )
        .with_score_page_size(config.source.score_page_size)
    }

    #[inline]
    #[must_use]
    pub fn with_score_page_size(mut self, score_page_size: u32) -> Self {
        self.score_page_size = score_page_size;
        self
    }

    /// Stop starting new batches once `deadline` has passed
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Items fetched so far over the fetcher's lifetime
    #[inline]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Fetch detail and score pages for `items` in batches of `concurrency`.
    ///
    /// Items are updated in place. Fetch failures are logged and the item
    /// keeps whatever it already had. The sink is awaited after each batch;
    /// the inter-batch delay only runs between batches.
    #[inline]
    pub async fn fetch_details_batch<K>(&self, items: &mut [PendingItem], sink: &mut K) -> FetchStats
    where
        K: BatchSink + ?Sized,
    {
        let total = items.len();
        let batch_count = total.div_ceil(self.concurrency);
        let mut stats = FetchStats::default();

        info!(
            "Fetching details for {} items in {} batches (concurrency {})",
            total, batch_count, self.concurrency
        );

        for (batch_index, batch) in items.chunks_mut(self.concurrency).enumerate() {
            if batch_index > 0 {
                if self.deadline_passed() {
                    warn!(
                        "Deadline reached after {} of {} batches, stopping early",
                        batch_index, batch_count
                    );
                    stats.aborted = true;
                    break;
                }
                sleep(self.inter_batch_delay).await;
            }

            let start = batch_index * self.concurrency;
            let end = start + batch.len();
            debug!("Starting batch {}/{} ({}..{})", batch_index + 1, batch_count, start, end);

            let outcomes = join_all(batch.iter_mut().map(|item| self.fetch_item(item, total))).await;
            for outcome in outcomes {
                stats.record(outcome);
            }
            stats.batches += 1;

            sink.on_batch_complete(batch, start, end).await;
        }

        info!(
            "Fetched {} items ({} skipped, {} detail failures, {} score failures)",
            stats.fetched, stats.skipped, stats.detail_failures, stats.score_failures
        );
        stats
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    async fn fetch_item(&self, item: &mut PendingItem, total: usize) -> ItemOutcome {
        let Some(external_id) = item.external_id() else {
            warn!("Skipping item without external id");
            return ItemOutcome::Skipped;
        };

        let Ok(_permit) = self.semaphore.acquire().await else {
            error!("Fetch slots closed, skipping game {}", external_id);
            return ItemOutcome::Skipped;
        };

        let (detail, scores) = tokio::join!(
            self.source.fetch_detail(external_id),
            self.source
                .fetch_scores_and_reviews(external_id, 0, self.score_page_size)
        );

        let detail_failed = match detail {
            Ok(Some(raw)) => {
                item.detail = parse_detail(&raw);
                if item.detail.is_none() {
                    debug!("Detail payload for game {} carried no game object", external_id);
                }
                false
            }
            Ok(None) => {
                debug!("No detail page for game {}", external_id);
                false
            }
            Err(e) => {
                warn!("Failed to fetch detail for game {}: {}", external_id, e);
                true
            }
        };

        let scores_failed = match scores {
            Ok(Some(raw)) => {
                item.scores = Some(parse_scores(&raw));
                false
            }
            Ok(None) => {
                debug!("No score page for game {}", external_id);
                false
            }
            Err(e) => {
                warn!("Failed to fetch scores for game {}: {}", external_id, e);
                true
            }
        };

        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_LOG_INTERVAL == 0 {
            info!("Fetched {} items so far ({} in this run)", done, total);
        }

        ItemOutcome::Fetched {
            detail_failed,
            scores_failed,
        }
    }
}

/// Accumulates rank list elements into one summary per game.
///
/// Games listed by several ranks are kept once, at their first position, with
/// every rank id accumulated in the order the ranks were added.
#[derive(Debug, Clone, Default)]
pub struct RankCollector {
    summaries: Vec<SummaryPartial>,
    positions: HashMap<i64, usize>,
}

impl RankCollector {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the elements of one rank; returns how many carried a game
    #[inline]
    pub fn add_rank(&mut self, rank_id: i64, elements: &[Value]) -> usize {
        let mut parsed = 0usize;

        for element in elements {
            let Some(mut summary) = parse_summary(element) else {
                debug!("Rank {} element without game info skipped", rank_id);
                continue;
            };
            let Some(external_id) = summary.fields.external_id else {
                debug!("Rank {} element without external id skipped", rank_id);
                continue;
            };
            parsed += 1;

            match self.positions.get(&external_id) {
                Some(&position) => {
                    let existing = &mut self.summaries[position];
                    if !existing.rank_ids.contains(&rank_id) {
                        existing.rank_ids.push(rank_id);
                    }
                }
                None => {
                    summary.rank_ids = vec![rank_id];
                    self.positions.insert(external_id, self.summaries.len());
                    self.summaries.push(summary);
                }
            }
        }

        parsed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    #[inline]
    pub fn into_summaries(self) -> Vec<SummaryPartial> {
        self.summaries
    }
}

/// Walk the pages of every rank and collect one summary per game.
///
/// A failing rank is logged and skipped. With a snapshot store, every fetched
/// rank is also saved for later replay; a failed save is only logged.
#[inline]
pub async fn collect_rank_summaries<S>(
    source: &S,
    rank_ids: &[i64],
    page_size: u32,
    rank_delay: Duration,
    snapshots: Option<&RankSnapshotStore>,
) -> Vec<SummaryPartial>
where
    S: CatalogSource + ?Sized,
{
    let mut collector = RankCollector::new();
    let total = rank_ids.len();

    for (index, rank_id) in rank_ids.iter().copied().enumerate() {
        if index > 0 {
            sleep(rank_delay).await;
        }

        let elements = match fetch_rank(source, rank_id, page_size).await {
            Ok(elements) => elements,
            Err(e) => {
                error!("Failed to fetch rank {}: {}", rank_id, e);
                continue;
            }
        };

        if let Some(store) = snapshots {
            if let Err(e) = store.save(rank_id, &elements).await {
                warn!("Failed to save rank {} snapshot: {}", rank_id, e);
            }
        }

        let parsed = collector.add_rank(rank_id, &elements);
        info!(
            "[{}/{}] Rank {}: {} games parsed",
            index + 1,
            total,
            rank_id,
            parsed
        );
    }

    info!(
        "Collected {} unique games from {} ranks",
        collector.len(),
        total
    );
    collector.into_summaries()
}

/// Collect summaries from previously saved rank snapshots.
///
/// Ranks without a snapshot, or with an unreadable one, are logged and skipped.
#[inline]
pub async fn load_rank_summaries(
    snapshots: &RankSnapshotStore,
    rank_ids: &[i64],
) -> Vec<SummaryPartial> {
    let mut collector = RankCollector::new();
    let total = rank_ids.len();

    for (index, rank_id) in rank_ids.iter().copied().enumerate() {
        let snapshot = match snapshots.load(rank_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                warn!(
                    "[{}/{}] No snapshot for rank {} in {}",
                    index + 1,
                    total,
                    rank_id,
                    snapshots.dir().display()
                );
                continue;
            }
            Err(e) => {
                error!("Failed to load rank {} snapshot: {}", rank_id, e);
                continue;
            }
        };

        let parsed = collector.add_rank(rank_id, &snapshot.list_elements);
        info!(
            "[{}/{}] Rank {} snapshot: {} games parsed",
            index + 1,
            total,
            rank_id,
            parsed
        );
    }

    info!(
        "Loaded {} unique games from {} rank snapshots",
        collector.len(),
        total
    );
    collector.into_summaries()
}

async fn fetch_rank<S>(
    source: &S,
    rank_id: i64,
    page_size: u32,
) -> crate::Result<Vec<Value>>
where
    S: CatalogSource + ?Sized,
{
    let mut elements = Vec::new();

    for page_index in 0..MAX_PAGES_PER_RANK {
        let page = source
            .fetch_summary_page(rank_id, page_index, page_size)
            .await?;
        let page_len = page.len();
        elements.extend(page);

        if page_len < page_size as usize {
            return Ok(elements);
        }
    }

    warn!(
        "Rank {} still returned full pages after {} pages, stopping",
        rank_id, MAX_PAGES_PER_RANK
    );
    Ok(elements)
}
