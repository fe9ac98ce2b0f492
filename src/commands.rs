use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::models::{CleanedRecord, SummaryPartial};
use crate::config::Config;
use crate::database::sqlite::{
    CapabilitySet, Database, EMBEDDINGS_TABLE, GAMES_TABLE, GameQueries, RelationKind,
};
use crate::embeddings::{EmbeddingPipeline, EmbeddingStats, OllamaClient};
use crate::orchestrator::{
    BatchSink, DetailFetcher, FetchStats, PendingItem, collect_rank_summaries,
    load_rank_summaries,
};
use crate::persist::{BatchStats, PersistenceEngine};
use crate::source::{CatalogSource, HttpCatalogSource, RankSnapshotStore};

/// Overrides for one `ingest` or `refresh` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub concurrency: Option<usize>,
    pub delay_ms: Option<u64>,
    pub limit: Option<usize>,
    pub deadline: Option<Duration>,
}

impl RunOptions {
    /// `config` with this run's batch overrides applied
    #[inline]
    pub fn apply(&self, config: &Config) -> Config {
        let mut effective = config.clone();
        if let Some(concurrency) = self.concurrency {
            effective.ingest.concurrency = concurrency;
        }
        if let Some(delay_ms) = self.delay_ms {
            effective.ingest.inter_batch_delay_ms = delay_ms;
        }
        effective
    }
}

/// What a fetch-and-persist run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items: usize,
    pub fetch: FetchStats,
    pub persisted: BatchStats,
}

/// Persists each completed batch and reports progress
pub struct PersistingSink<'a> {
    engine: &'a PersistenceEngine,
    bar: ProgressBar,
    totals: BatchStats,
}

impl<'a> PersistingSink<'a> {
    #[inline]
    pub fn new(engine: &'a PersistenceEngine, total: usize) -> Self {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(total as u64).with_style(
                ProgressStyle::with_template("{bar:30} [{pos}/{len}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        Self {
            engine,
            bar,
            totals: BatchStats::default(),
        }
    }

    #[inline]
    pub fn totals(&self) -> BatchStats {
        self.totals
    }

    #[inline]
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[async_trait]
impl BatchSink for PersistingSink<'_> {
    async fn on_batch_complete(&mut self, items: &[PendingItem], start: usize, end: usize) {
        let stats = self.engine.persist_batch(items).await;
        self.totals += stats;

        self.bar.set_position(end as u64);
        self.bar
            .set_message(format!("{} persisted", self.totals.persisted()));
        self.bar.suspend(|| {
            println!(
                "Items {}-{}: {} created, {} updated, {} failed",
                start + 1,
                end,
                stats.created,
                stats.updated,
                stats.failed
            );
        });
    }
}

/// Parse a rank selection such as `"1-3,7"` into sorted, unique ids
#[inline]
pub fn parse_rank_ids(selection: &str) -> Result<Vec<i64>> {
    let mut ids = BTreeSet::new();

    for part in selection.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: i64 = start
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid rank range start in '{}'", part))?;
                let end: i64 = end
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid rank range end in '{}'", part))?;
                if start > end {
                    bail!("Rank range '{}' is reversed", part);
                }
                ids.extend(start..=end);
            }
            None => {
                ids.insert(
                    part.parse::<i64>()
                        .with_context(|| format!("Invalid rank id '{}'", part))?,
                );
            }
        }
    }

    if ids.is_empty() {
        bail!("No rank ids in '{}'", selection);
    }
    Ok(ids.into_iter().collect())
}

/// Where `ingest` takes its rank lists from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankInput {
    /// Fetch ranks from upstream and save a snapshot of each one
    #[default]
    Live,
    /// Replay snapshots saved by an earlier live run
    Snapshot {
        /// Also fetch detail and score pages; otherwise only the rank data is stored
        fetch_details: bool,
    },
}

/// Collect the given ranks, fetch every game's detail and score pages and persist them.
///
/// Live runs save each fetched rank under `base_dir/ranks`; snapshot runs read
/// those files instead of fetching ranks again.
#[inline]
pub async fn ingest(
    config: &Config,
    rank_ids: &[i64],
    input: RankInput,
    options: &RunOptions,
) -> Result<RunSummary> {
    let snapshots = RankSnapshotStore::in_base_dir(&config.base_dir);

    match input {
        RankInput::Live => {
            let source = Arc::new(
                HttpCatalogSource::new(&config.source).context("Upstream source is not usable")?,
            );
            let database = open_database(config).await?;

            let summaries = collect_rank_summaries(
                source.as_ref(),
                rank_ids,
                config.source.page_size,
                Duration::from_millis(config.source.rank_delay_ms),
                Some(&snapshots),
            )
            .await;

            let items = pending_items(summaries, options.limit);
            run_fetch_and_persist(source, &database, config, options, items).await
        }
        RankInput::Snapshot {
            fetch_details: true,
        } => {
            let source = Arc::new(
                HttpCatalogSource::new(&config.source).context("Upstream source is not usable")?,
            );
            let database = open_database(config).await?;

            let summaries = load_rank_summaries(&snapshots, rank_ids).await;
            let items = pending_items(summaries, options.limit);
            run_fetch_and_persist(source, &database, config, options, items).await
        }
        RankInput::Snapshot {
            fetch_details: false,
        } => {
            let database = open_database(config).await?;

            let summaries = load_rank_summaries(&snapshots, rank_ids).await;
            let items = pending_items(summaries, options.limit);
            persist_summaries(&database, config, options, &items).await
        }
    }
}

fn pending_items(mut summaries: Vec<SummaryPartial>, limit: Option<usize>) -> Vec<PendingItem> {
    if let Some(limit) = limit {
        summaries.truncate(limit);
    }
    summaries.into_iter().map(PendingItem::new).collect()
}

/// Persist rank data as it is, without fetching detail or score pages
#[inline]
pub async fn persist_summaries(
    database: &Database,
    config: &Config,
    options: &RunOptions,
    items: &[PendingItem],
) -> Result<RunSummary> {
    let engine = PersistenceEngine::new(database).await?;
    let batch_size = options.apply(config).ingest.concurrency.max(1);

    let mut sink = PersistingSink::new(&engine, items.len());
    let mut fetch = FetchStats::default();
    for (index, batch) in items.chunks(batch_size).enumerate() {
        let start = index * batch_size;
        sink.on_batch_complete(batch, start, start + batch.len()).await;
        fetch.batches += 1;
    }
    sink.finish();

    let summary = RunSummary {
        items: items.len(),
        fetch,
        persisted: sink.totals(),
    };
    print_run_summary(&summary);
    Ok(summary)
}

/// Re-fetch detail and score pages for games already stored
#[inline]
pub async fn refresh(config: &Config, options: &RunOptions) -> Result<RunSummary> {
    let source = Arc::new(
        HttpCatalogSource::new(&config.source).context("Upstream source is not usable")?,
    );
    let database = open_database(config).await?;
    let capabilities = database.capabilities().await?;

    let limit = options.limit.and_then(|limit| i64::try_from(limit).ok());
    let keys = GameQueries::list_keys(database.pool(), limit).await?;

    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some((item, relations)) = database.load_item(key.external_id, &capabilities).await? {
            let record = CleanedRecord { item, relations };
            items.push(PendingItem::new(SummaryPartial::from(&record)));
        }
    }

    info!("Refreshing {} stored games", items.len());
    run_fetch_and_persist(source, &database, config, options, items).await
}

/// Fetch and persist `items` in batches, printing a final summary
#[inline]
pub async fn run_fetch_and_persist<S>(
    source: Arc<S>,
    database: &Database,
    config: &Config,
    options: &RunOptions,
    mut items: Vec<PendingItem>,
) -> Result<RunSummary>
where
    S: CatalogSource + ?Sized,
{
    let engine = PersistenceEngine::new(database).await?;

    let mut fetcher = DetailFetcher::from_config(source, &options.apply(config));
    if let Some(deadline) = options.deadline {
        fetcher = fetcher.with_deadline(tokio::time::Instant::now() + deadline);
    }

    let mut sink = PersistingSink::new(&engine, items.len());
    let fetch = fetcher.fetch_details_batch(&mut items, &mut sink).await;
    sink.finish();

    let summary = RunSummary {
        items: items.len(),
        fetch,
        persisted: sink.totals(),
    };
    print_run_summary(&summary);
    Ok(summary)
}

fn print_run_summary(summary: &RunSummary) {
    println!();
    println!("{}", style("Run summary").bold());
    println!("  Items: {}", summary.items);
    println!(
        "  Fetched: {} ({} skipped, {} detail failures, {} score failures)",
        summary.fetch.fetched,
        summary.fetch.skipped,
        summary.fetch.detail_failures,
        summary.fetch.score_failures
    );
    println!("  Persisted: {}", summary.persisted);
    if summary.fetch.aborted {
        println!(
            "  {}",
            style("Stopped early: deadline reached").yellow()
        );
    }
}

/// Build embedding text for stored games and store their vectors
#[inline]
pub async fn embed(config: &Config, limit: Option<usize>, all: bool) -> Result<EmbeddingStats> {
    let database = open_database(config).await?;
    let client = OllamaClient::new(&config.embedding)?;

    let check_client = client.clone();
    tokio::task::spawn_blocking(move || check_client.health_check())
        .await
        .context("Health check task failed")?
        .context("Embedding server is not usable")?;

    let pipeline = EmbeddingPipeline::new(
        &database,
        &client,
        config.embedding.embedding_dimension as usize,
        config.ingest.max_reviews,
    )
    .await?;

    let limit = limit.and_then(|limit| i64::try_from(limit).ok());
    let keys = pipeline.pending_games(all, limit).await?;
    if keys.is_empty() {
        println!("No games need embeddings.");
        return Ok(EmbeddingStats::default());
    }

    let stats = pipeline.embed_games(&keys).await;
    println!(
        "Embedded {} games ({} skipped, {} failed)",
        stats.embedded, stats.skipped, stats.failed
    );
    Ok(stats)
}

/// Report which catalog tables exist in the configured database
#[inline]
pub async fn show_tables(config: &Config) -> Result<CapabilitySet> {
    let path = config.database_path();
    if !path.exists() {
        bail!("No catalog database at {}", path.display());
    }

    let database = Database::open_existing(&path).await?;
    let capabilities = database.capabilities().await?;

    println!("{}", style(format!("Tables in {}", path.display())).bold());
    let tables = std::iter::once(GAMES_TABLE)
        .chain(RelationKind::ALL.iter().map(|kind| kind.table_name()))
        .chain(std::iter::once(EMBEDDINGS_TABLE));
    for table in tables {
        if capabilities.has_table(table) {
            println!("  {} {}", style("✓").green(), table);
        } else {
            println!("  {} {}", style("✗").red(), table);
        }
    }

    if capabilities.is_degraded() {
        warn!("Relation tables are missing; ingestion will skip those relations");
    }
    Ok(capabilities)
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(&config.base_dir)
        .await
        .context("Failed to initialize database")
}
