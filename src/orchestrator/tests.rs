use super::*;
use crate::catalog::models::GameFields;
use crate::{IngestError, Result};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct MockSource {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    failing_details: HashSet<i64>,
    failing_ranks: HashSet<i64>,
    rank_pages: HashMap<i64, Vec<Vec<Value>>>,
    page_requests: Mutex<Vec<(i64, u32)>>,
}

impl MockSource {
    async fn track<T>(&self, value: T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        value
    }
}

#[async_trait]
impl CatalogSource for MockSource {
    async fn fetch_summary_page(
        &self,
        section_id: i64,
        page_index: u32,
        _page_size: u32,
    ) -> Result<Vec<Value>> {
        self.page_requests
            .lock()
            .expect("lock poisoned")
            .push((section_id, page_index));
        if self.failing_ranks.contains(&section_id) {
            return Err(IngestError::Upstream(format!("rank {} unavailable", section_id)));
        }
        Ok(self
            .rank_pages
            .get(&section_id)
            .and_then(|pages| pages.get(page_index as usize))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_detail(&self, item_id: i64) -> Result<Option<Value>> {
        let response = if self.failing_details.contains(&item_id) {
            Err(IngestError::Upstream(format!("detail {} failed", item_id)))
        } else {
            Ok(Some(json!({"game": {"id": item_id, "title": format!("Detail {}", item_id)}})))
        };
        self.track(response).await
    }

    async fn fetch_scores_and_reviews(
        &self,
        item_id: i64,
        _page_index: u32,
        _page_size: u32,
    ) -> Result<Option<Value>> {
        self.track(Ok(Some(json!({
            "gameId": item_id,
            "gameScoreInfo": {"userScore": 8.0}
        }))))
        .await
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Vec<(Vec<Option<i64>>, usize, usize)>,
    details_seen: Vec<bool>,
}

#[async_trait]
impl BatchSink for RecordingSink {
    async fn on_batch_complete(&mut self, items: &[PendingItem], start: usize, end: usize) {
        self.batches.push((
            items.iter().map(PendingItem::external_id).collect(),
            start,
            end,
        ));
        self.details_seen
            .extend(items.iter().map(|item| item.detail.is_some()));
    }
}

fn pending_items(ids: impl IntoIterator<Item = i64>) -> Vec<PendingItem> {
    ids.into_iter()
        .map(|id| {
            PendingItem::new(SummaryPartial {
                fields: GameFields {
                    external_id: Some(id),
                    title: Some(format!("Summary {}", id)),
                    ..GameFields::default()
                },
                ..SummaryPartial::default()
            })
        })
        .collect()
}

fn rank_element(id: i64) -> Value {
    json!({"gameInfo": {"id": id, "title": format!("Game {}", id)}})
}

#[tokio::test]
async fn seven_items_at_concurrency_three_make_three_batches() {
    let source = Arc::new(MockSource::default());
    let fetcher = DetailFetcher::new(Arc::clone(&source), 3, Duration::ZERO);
    let mut items = pending_items(1..=7);
    let mut sink = RecordingSink::default();

    let stats = fetcher.fetch_details_batch(&mut items, &mut sink).await;

    assert_eq!(
        sink.batches,
        vec![
            (vec![Some(1), Some(2), Some(3)], 0, 3),
            (vec![Some(4), Some(5), Some(6)], 3, 6),
            (vec![Some(7)], 6, 7),
        ]
    );
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.fetched, 7);
    assert!(!stats.aborted);
    assert_eq!(fetcher.completed(), 7);
    assert!(source.max_in_flight.load(Ordering::SeqCst) <= 3 * 2);

    let first = &items[0];
    assert_eq!(
        first.detail.as_ref().and_then(|detail| detail.fields.title.as_deref()),
        Some("Detail 1")
    );
    assert_eq!(
        first.scores.as_ref().and_then(|scores| scores.user_score),
        Some(Some(8.0))
    );
}

#[tokio::test]
async fn in_flight_items_never_exceed_concurrency() {
    let source = Arc::new(MockSource::default());
    let fetcher = DetailFetcher::new(Arc::clone(&source), 2, Duration::ZERO);
    let mut items = pending_items(1..=6);
    let mut sink = RecordingSink::default();

    fetcher.fetch_details_batch(&mut items, &mut sink).await;

    // Each item runs its detail and score fetches together
    let max = source.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 4, "max in flight was {}", max);
    assert!(max >= 2, "max in flight was {}", max);
}

#[tokio::test]
async fn failing_detail_keeps_item_in_its_batch() {
    let source = Arc::new(MockSource {
        failing_details: HashSet::from([2]),
        ..MockSource::default()
    });
    let fetcher = DetailFetcher::new(Arc::clone(&source), 3, Duration::ZERO);
    let mut items = pending_items(1..=3);
    let mut sink = RecordingSink::default();

    let stats = fetcher.fetch_details_batch(&mut items, &mut sink).await;

    assert_eq!(sink.batches.len(), 1);
    assert_eq!(sink.batches[0].0, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(sink.details_seen, vec![true, false, true]);
    assert_eq!(stats.detail_failures, 1);
    assert_eq!(stats.score_failures, 0);
    assert!(items[1].scores.is_some());
}

#[tokio::test]
async fn items_without_external_id_are_skipped() {
    let source = Arc::new(MockSource::default());
    let fetcher = DetailFetcher::new(Arc::clone(&source), 5, Duration::ZERO);
    let mut items = pending_items([1]);
    items.push(PendingItem::default());
    let mut sink = RecordingSink::default();

    let stats = fetcher.fetch_details_batch(&mut items, &mut sink).await;

    assert_eq!(stats.fetched, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(sink.batches[0].0, vec![Some(1), None]);
}

#[tokio::test(start_paused = true)]
async fn delay_runs_only_between_batches() {
    let source = Arc::new(MockSource::default());
    let fetcher = DetailFetcher::new(Arc::clone(&source), 2, Duration::from_secs(10));
    let mut items = pending_items(1..=4);
    let mut sink = RecordingSink::default();

    let started = Instant::now();
    fetcher.fetch_details_batch(&mut items, &mut sink).await;
    let elapsed = started.elapsed();

    // Two batches of 20ms fetches with one delay in between
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11), "elapsed {:?}", elapsed);
    assert_eq!(sink.batches.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_before_next_batch() {
    let source = Arc::new(MockSource::default());
    let fetcher = DetailFetcher::new(Arc::clone(&source), 2, Duration::from_secs(1))
        .with_deadline(Instant::now());
    let mut items = pending_items(1..=6);
    let mut sink = RecordingSink::default();

    let stats = fetcher.fetch_details_batch(&mut items, &mut sink).await;

    assert!(stats.aborted);
    assert_eq!(stats.batches, 1);
    assert_eq!(sink.batches.len(), 1);
    assert!(items[2].detail.is_none());
}

#[test]
fn zero_concurrency_is_treated_as_one() {
    let fetcher = DetailFetcher::new(Arc::new(MockSource::default()), 0, Duration::ZERO);
    assert_eq!(fetcher.concurrency(), 1);
}

#[tokio::test]
async fn rank_summaries_are_deduplicated_across_ranks() {
    let mut rank_pages = HashMap::new();
    rank_pages.insert(
        1,
        vec![
            vec![rank_element(10), rank_element(11)],
            vec![rank_element(12)],
        ],
    );
    rank_pages.insert(2, vec![vec![rank_element(11), json!({"noGameInfo": true})]]);
    let source = MockSource {
        rank_pages,
        failing_ranks: HashSet::from([3]),
        ..MockSource::default()
    };

    let summaries = collect_rank_summaries(&source, &[1, 3, 2], 2, Duration::ZERO, None).await;

    let ids: Vec<Option<i64>> = summaries
        .iter()
        .map(|summary| summary.fields.external_id)
        .collect();
    assert_eq!(ids, vec![Some(10), Some(11), Some(12)]);
    assert_eq!(summaries[1].rank_ids, vec![1, 2]);
    assert_eq!(summaries[0].rank_ids, vec![1]);

    // Rank 1 stops at its short second page, rank 2 at the empty page after a full one
    let requests = source.page_requests.lock().expect("lock poisoned").clone();
    assert_eq!(requests, vec![(1, 0), (1, 1), (3, 0), (2, 0), (2, 1)]);
}

#[tokio::test]
async fn rank_with_exactly_full_pages_stops_at_empty_page() {
    let mut rank_pages = HashMap::new();
    rank_pages.insert(5, vec![vec![rank_element(1), rank_element(2)]]);
    let source = MockSource {
        rank_pages,
        ..MockSource::default()
    };

    let summaries = collect_rank_summaries(&source, &[5], 2, Duration::ZERO, None).await;

    assert_eq!(summaries.len(), 2);
    let requests = source.page_requests.lock().expect("lock poisoned").clone();
    assert_eq!(requests, vec![(5, 0), (5, 1)]);
}

#[tokio::test]
async fn fetched_ranks_replay_from_snapshots() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let store = RankSnapshotStore::in_base_dir(temp_dir.path());

    let mut rank_pages = HashMap::new();
    rank_pages.insert(
        1,
        vec![
            vec![rank_element(10), rank_element(11)],
            vec![rank_element(12)],
        ],
    );
    rank_pages.insert(2, vec![vec![rank_element(11)]]);
    let source = MockSource {
        rank_pages,
        failing_ranks: HashSet::from([3]),
        ..MockSource::default()
    };

    let live =
        collect_rank_summaries(&source, &[1, 3, 2], 2, Duration::ZERO, Some(&store)).await;

    let saved = store
        .load(1)
        .await
        .expect("load should succeed")
        .expect("rank 1 should be saved");
    assert_eq!(saved.list_elements.len(), 3);
    assert!(
        store
            .load(3)
            .await
            .expect("load should succeed")
            .is_none(),
        "a failed rank leaves no snapshot"
    );

    let requests_before = source.page_requests.lock().expect("lock poisoned").len();
    let replayed = load_rank_summaries(&store, &[1, 3, 2]).await;

    assert_eq!(replayed, live);
    assert_eq!(replayed[1].rank_ids, vec![1, 2]);
    assert_eq!(
        source.page_requests.lock().expect("lock poisoned").len(),
        requests_before
    );
}

#[test]
fn rank_collector_keeps_first_position() {
    let mut collector = RankCollector::new();
    assert!(collector.is_empty());

    let parsed = collector.add_rank(7, &[rank_element(2), json!({"ad": true}), rank_element(1)]);
    assert_eq!(parsed, 2);
    assert_eq!(collector.add_rank(8, &[rank_element(1), rank_element(3)]), 2);
    assert_eq!(collector.add_rank(8, &[rank_element(1)]), 1);

    let summaries = collector.into_summaries();
    let ids: Vec<Option<i64>> = summaries
        .iter()
        .map(|summary| summary.fields.external_id)
        .collect();
    assert_eq!(ids, vec![Some(2), Some(1), Some(3)]);
    assert_eq!(summaries[1].rank_ids, vec![7, 8]);
}
