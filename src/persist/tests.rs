use super::*;
use crate::catalog::models::{GameFields, SummaryPartial};
use crate::IngestError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

async fn create_test_database() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("Failed to create test database");
    (temp_dir, database)
}

/// Database holding only the `games` table
async fn create_games_only_pool() -> (TempDir, DbPool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(temp_dir.path().join("games_only.db"))
                .create_if_missing(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::query(include_str!("../database/sqlite/migrations/001_games.sql"))
        .execute(&pool)
        .await
        .expect("Failed to create games table");

    (temp_dir, pool)
}

fn summary(external_id: Option<i64>, title: Option<&str>) -> SummaryPartial {
    SummaryPartial {
        fields: GameFields {
            external_id,
            title: title.map(str::to_string),
            platforms: Some(vec!["PC".to_string()]),
            ..GameFields::default()
        },
        ..SummaryPartial::default()
    }
}

fn pending(external_id: Option<i64>, title: Option<&str>) -> PendingItem {
    PendingItem::new(summary(external_id, title))
}

fn quote(platform: &str, price: f64) -> PriceQuote {
    PriceQuote {
        platform_name: platform.to_string(),
        price: Some(price),
        ..PriceQuote::default()
    }
}

fn review(comment_id: i64, content: &str) -> ReviewRecord {
    ReviewRecord {
        external_comment_id: comment_id,
        ordernum: 1,
        content: content.to_string(),
        ..ReviewRecord::default()
    }
}

fn full_relations() -> RelationBundle {
    RelationBundle {
        rank_ids: vec![1, 2],
        price_quotes: vec![quote("PC", 98.0), quote("Switch", 300.0)],
        media_scores: vec![MediaScore {
            media_name: "IGN".to_string(),
            score: Some(9.0),
            total_score: Some(10.0),
            content_url: None,
        }],
        reviews: vec![review(100, "Great"), review(101, "Fine")],
    }
}

fn item(external_id: i64, title: &str) -> CanonicalItem {
    let merged = merge(&summary(Some(external_id), Some(title)), None, None);
    clean(merged).expect("sample item should clean").item
}

#[tokio::test]
async fn double_upsert_creates_then_updates() {
    let (_temp_dir, database) = create_test_database().await;
    let engine = PersistenceEngine::new(&database)
        .await
        .expect("Failed to create engine");

    let first = engine
        .upsert(&item(7, "Original"), &RelationBundle::default())
        .await
        .expect("first upsert should succeed");
    let second = engine
        .upsert(&item(7, "Renamed"), &RelationBundle::default())
        .await
        .expect("second upsert should succeed");

    assert_eq!(first.outcome, UpsertOutcome::Created);
    assert_eq!(second.outcome, UpsertOutcome::Updated);
    assert_eq!(first.game_id, second.game_id);
    assert_eq!(
        GameQueries::count(database.pool())
            .await
            .expect("Failed to count games"),
        1
    );

    let row = GameQueries::get_by_external_id(database.pool(), 7)
        .await
        .expect("Failed to load game")
        .expect("game should exist");
    assert_eq!(row.title, "Renamed");
    assert!(row.updated_at >= row.created_at);
}

#[tokio::test]
async fn relations_are_reconciled_without_duplicates() {
    let (_temp_dir, database) = create_test_database().await;
    let engine = PersistenceEngine::new(&database)
        .await
        .expect("Failed to create engine");
    let relations = full_relations();

    let first = engine
        .upsert(&item(1, "Game"), &relations)
        .await
        .expect("upsert should succeed");
    assert_eq!(
        first.relations,
        RelationCounts {
            rank_memberships: 2,
            prices: 2,
            media_scores: 1,
            reviews: 2,
            failures: 0,
        }
    );

    let mut changed = relations.clone();
    changed.price_quotes = vec![quote("PC", 49.0)];
    let second = engine
        .upsert(&item(1, "Game"), &changed)
        .await
        .expect("upsert should succeed");
    assert_eq!(second.relations.failures, 0);
    assert_eq!(second.relations.rank_memberships, 0);

    let pool = database.pool();
    assert_eq!(
        RelationQueries::rank_ids_for_game(pool, first.game_id)
            .await
            .expect("Failed to load ranks"),
        vec![1, 2]
    );
    let prices = RelationQueries::prices_for_game(pool, first.game_id)
        .await
        .expect("Failed to load prices");
    assert_eq!(prices.len(), 2);
    let pc = prices
        .iter()
        .find(|row| row.platform_name == "PC")
        .expect("PC price should exist");
    assert_eq!(pc.price, Some(49.0));
    assert_eq!(
        RelationQueries::reviews_for_game(pool, first.game_id)
            .await
            .expect("Failed to load reviews")
            .len(),
        2
    );
}

#[tokio::test]
async fn missing_relation_tables_mean_zero_writes() {
    let (_temp_dir, pool) = create_games_only_pool().await;
    let capabilities = CapabilitySet::detect(&pool)
        .await
        .expect("Failed to detect capabilities");
    assert!(capabilities.is_degraded());

    let engine = PersistenceEngine::with_capabilities(pool.clone(), capabilities);
    let result = engine
        .upsert(&item(3, "Lonely"), &full_relations())
        .await
        .expect("upsert should succeed without relation tables");

    assert_eq!(result.outcome, UpsertOutcome::Created);
    assert_eq!(result.relations, RelationCounts::default());
    assert_eq!(
        GameQueries::count(&pool).await.expect("Failed to count games"),
        1
    );
}

#[tokio::test]
async fn relation_failure_is_isolated() {
    let (_temp_dir, database) = create_test_database().await;
    sqlx::query(
        "CREATE TRIGGER reject_price BEFORE INSERT ON game_prices
         WHEN NEW.platform_name = 'Broken'
         BEGIN SELECT RAISE(ABORT, 'price rejected'); END;",
    )
    .execute(database.pool())
    .await
    .expect("Failed to create trigger");

    let engine = PersistenceEngine::new(&database)
        .await
        .expect("Failed to create engine");
    let relations = RelationBundle {
        price_quotes: vec![quote("PC", 10.0), quote("Broken", 1.0), quote("PS5", 20.0)],
        reviews: vec![review(5, "Still saved")],
        ..RelationBundle::default()
    };

    let result = engine
        .upsert(&item(9, "Partial"), &relations)
        .await
        .expect("primary row should persist");

    assert_eq!(result.relations.prices, 2);
    assert_eq!(result.relations.reviews, 1);
    assert_eq!(result.relations.failures, 1);

    let prices = RelationQueries::prices_for_game(database.pool(), result.game_id)
        .await
        .expect("Failed to load prices");
    let platforms: Vec<&str> = prices.iter().map(|row| row.platform_name.as_str()).collect();
    assert_eq!(platforms, vec!["PC", "PS5"]);
}

#[tokio::test]
async fn persist_batch_counts_each_failure_tier() {
    let (_temp_dir, database) = create_test_database().await;
    for trigger in [
        "CREATE TRIGGER reject_game BEFORE INSERT ON games
         WHEN NEW.title = 'Broken'
         BEGIN SELECT RAISE(ABORT, 'game rejected'); END;",
        "CREATE TRIGGER reject_price BEFORE INSERT ON game_prices
         WHEN NEW.platform_name = 'Broken'
         BEGIN SELECT RAISE(ABORT, 'price rejected'); END;",
    ] {
        sqlx::query(trigger)
            .execute(database.pool())
            .await
            .expect("Failed to create trigger");
    }

    let engine = PersistenceEngine::new(&database)
        .await
        .expect("Failed to create engine");

    let mut with_bad_price = pending(Some(4), Some("Priced"));
    with_bad_price.summary.price_quotes = Some(vec![quote("Broken", 1.0), quote("PC", 5.0)]);
    let mut bad_primary = pending(Some(3), Some("Broken"));
    bad_primary.summary.price_quotes = Some(vec![quote("PC", 5.0)]);

    let items = vec![
        pending(Some(1), Some("Fine")),
        pending(Some(2), None),
        bad_primary,
        with_bad_price,
    ];

    let stats = engine.persist_batch(&items).await;

    assert_eq!(stats.created, 2);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.relations.prices, 1);
    assert_eq!(stats.relations.failures, 1);
    assert_eq!(
        GameQueries::count(database.pool())
            .await
            .expect("Failed to count games"),
        2
    );

    let again = engine.persist_batch(&items[..1]).await;
    assert_eq!(again.updated, 1);
}

#[tokio::test]
async fn existing_rank_memberships_are_not_counted() {
    let (_temp_dir, database) = create_test_database().await;
    let engine = PersistenceEngine::new(&database)
        .await
        .expect("Failed to create engine");
    let relations = RelationBundle {
        rank_ids: vec![1, 2],
        ..RelationBundle::default()
    };

    let first = engine
        .upsert(&item(11, "Ranked"), &relations)
        .await
        .expect("upsert should succeed");
    assert_eq!(first.relations.rank_memberships, 2);

    let second = engine
        .upsert(&item(11, "Ranked"), &relations)
        .await
        .expect("upsert should succeed");
    assert_eq!(second.relations.rank_memberships, 0);
    assert_eq!(second.relations.failures, 0);

    let mut widened = relations.clone();
    widened.rank_ids.push(3);
    let third = engine
        .upsert(&item(11, "Ranked"), &widened)
        .await
        .expect("upsert should succeed");
    assert_eq!(third.relations.rank_memberships, 1);

    assert_eq!(
        RelationQueries::rank_ids_for_game(database.pool(), first.game_id)
            .await
            .expect("Failed to load ranks"),
        vec![1, 2, 3]
    );
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("log buffer poisoned").clone())
            .expect("logs should be utf-8")
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn relation_failures_name_the_external_id() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let mut counts = RelationCounts::default();
    tracing::subscriber::with_default(subscriber, || {
        tally(
            &mut counts,
            4242,
            RelationKind::Price,
            &"Broken",
            Err(IngestError::Validation("price rejected".to_string())),
        );
    });

    assert_eq!(counts.failures, 1);
    assert_eq!(counts.written(), 0);
    let output = logs.contents();
    assert!(output.contains("for game 4242"), "unexpected log: {}", output);
    assert!(output.contains("price rejected"));
}

#[test]
fn unchanged_relations_are_neither_written_nor_failed() {
    let mut counts = RelationCounts::default();
    tally(&mut counts, 1, RelationKind::RankMembership, &3, Ok(false));
    tally(&mut counts, 1, RelationKind::RankMembership, &4, Ok(true));

    assert_eq!(counts.rank_memberships, 1);
    assert_eq!(counts.failures, 0);
}

#[test]
fn batch_stats_add_up() {
    let mut total = BatchStats::default();
    total += BatchStats {
        created: 2,
        updated: 1,
        failed: 1,
        relations: RelationCounts {
            prices: 3,
            failures: 1,
            ..RelationCounts::default()
        },
    };
    total += BatchStats {
        created: 1,
        relations: RelationCounts {
            reviews: 4,
            ..RelationCounts::default()
        },
        ..BatchStats::default()
    };

    assert_eq!(total.created, 3);
    assert_eq!(total.persisted(), 4);
    assert_eq!(total.relations.written(), 7);
    assert_eq!(total.relations.failures, 1);
    assert_eq!(
        total.to_string(),
        "3 created, 1 updated, 1 failed; relations: 0 ranks, 3 prices, 0 media scores, 4 reviews, 1 failed"
    );
}
