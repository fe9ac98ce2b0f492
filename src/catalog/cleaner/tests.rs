use super::*;
use crate::catalog::merge;
use crate::catalog::models::{GameFields, PriceFields, ScoreFields, SummaryPartial};

fn merged(external_id: Option<i64>, title: Option<&str>) -> MergedRecord {
    MergedRecord {
        fields: GameFields {
            external_id,
            title: title.map(str::to_string),
            ..GameFields::default()
        },
        ..MergedRecord::default()
    }
}

fn with_score(score: Option<f64>) -> MergedRecord {
    let mut record = merged(Some(1), Some("Game"));
    record.scores.user_score = score;
    record
}

fn quote(platform: &str, price: f64) -> PriceQuote {
    PriceQuote {
        platform_name: platform.to_string(),
        price: Some(price),
        ..PriceQuote::default()
    }
}

#[test]
fn user_score_is_clamped_into_range() {
    let cases = [
        (Some(-5.0), None),
        (Some(15.0), Some(10.0)),
        (Some(7.3), Some(7.3)),
        (Some(f64::NAN), None),
        (Some(f64::INFINITY), None),
        (None, None),
    ];

    for (input, expected) in cases {
        let cleaned = clean(with_score(input)).expect("clean should succeed");
        assert_eq!(cleaned.item.user_score, expected, "input {:?}", input);
    }
}

#[test]
fn negative_prices_become_zero() {
    let mut record = merged(Some(1), Some("Game"));
    record.pricing = PriceFields {
        price: Some(-3.0),
        price_original: Some(59.0),
        ..PriceFields::default()
    };
    record.price_quotes = Some(vec![quote("PC", -1.0)]);

    let cleaned = clean(record).expect("clean should succeed");
    assert_eq!(cleaned.item.price, Some(0.0));
    assert_eq!(cleaned.item.price_original, Some(59.0));
    assert_eq!(cleaned.relations.price_quotes[0].price, Some(0.0));
}

#[test]
fn missing_required_fields_fail_validation() {
    for record in [
        merged(None, Some("Game")),
        merged(Some(0), Some("Game")),
        merged(Some(1), None),
        merged(Some(1), Some("   ")),
    ] {
        let result = clean(record);
        assert!(
            matches!(result, Err(IngestError::Validation(_))),
            "expected validation error, got {:?}",
            result
        );
    }
}

#[test]
fn other_anomalies_never_fail() {
    let mut record = merged(Some(9), Some("  Padded Title  "));
    record.fields.developer_name = Some("   ".to_string());
    record.fields.tags = Some(vec![" rpg ".to_string(), String::new(), "rpg".to_string()]);
    record.scores = ScoreFields {
        user_score: Some(-1.0),
        ..ScoreFields::default()
    };

    let cleaned = clean(record).expect("clean should succeed");
    assert_eq!(cleaned.item.title, "Padded Title");
    assert_eq!(cleaned.item.developer_name, None);
    assert_eq!(cleaned.item.tags, vec!["rpg".to_string()]);
}

#[test]
fn defaults_are_filled() {
    let cleaned = clean(merged(Some(5), Some("Game"))).expect("clean should succeed");

    assert_eq!(cleaned.item.source, DEFAULT_SOURCE);
    assert!(!cleaned.item.is_free);
    assert!(cleaned.item.platforms.is_empty());
    assert!(cleaned.item.tags.is_empty());
    assert!(cleaned.relations.is_empty());
}

#[test]
fn relation_entries_are_keyed_and_deduplicated() {
    let mut record = merged(Some(1), Some("Game"));
    record.rank_ids = vec![3, 1, 3];
    record.price_quotes = Some(vec![quote("PC", 10.0), quote(" ", 5.0), quote("PC", 20.0)]);
    record.media_scores = Some(vec![
        MediaScore {
            media_name: "IGN".to_string(),
            score: Some(8.0),
            ..MediaScore::default()
        },
        MediaScore {
            media_name: String::new(),
            score: Some(1.0),
            ..MediaScore::default()
        },
        MediaScore {
            media_name: "IGN".to_string(),
            score: Some(2.0),
            ..MediaScore::default()
        },
    ]);
    record.reviews = Some(vec![
        ReviewRecord {
            external_comment_id: 11,
            content: "first".to_string(),
            ..ReviewRecord::default()
        },
        ReviewRecord {
            external_comment_id: 0,
            content: "keyless".to_string(),
            ..ReviewRecord::default()
        },
        ReviewRecord {
            external_comment_id: 11,
            content: "duplicate".to_string(),
            ..ReviewRecord::default()
        },
    ]);

    let relations = clean(record).expect("clean should succeed").relations;

    assert_eq!(relations.rank_ids, vec![3, 1]);
    assert_eq!(relations.price_quotes.len(), 1);
    assert_eq!(relations.price_quotes[0].price, Some(10.0));
    assert_eq!(relations.media_scores.len(), 1);
    assert_eq!(relations.media_scores[0].score, Some(8.0));
    assert_eq!(relations.reviews.len(), 1);
    assert_eq!(relations.reviews[0].content, "first");
}

#[test]
fn clean_after_merge_is_idempotent() {
    let mut record = merged(Some(77), Some(" Hollow Realm "));
    record.fields.title_english = Some("Hollow Realm EN".to_string());
    record.fields.platforms = Some(vec!["PC".to_string(), "PS5".to_string()]);
    record.fields.description = Some("A long journey".to_string());
    record.scores.user_score = Some(12.5);
    record.scores.playeds_count = Some(300);
    record.pricing.price = Some(-2.0);
    record.rank_ids = vec![1, 2];
    record.price_quotes = Some(vec![quote("PC", 68.0)]);

    let first = clean(record).expect("first clean should succeed");
    let summary = SummaryPartial::from(&first);
    let second = clean(merge(&summary, None, None)).expect("second clean should succeed");

    assert_eq!(first, second);
}

fn embedding_fixture(description: String, reviews: Vec<String>) -> (CanonicalItem, RelationBundle) {
    let mut record = merged(Some(3), Some("Starfall"));
    record.fields.title_english = Some("Starfall EN".to_string());
    record.fields.platforms = Some(vec!["PC".to_string(), "Switch".to_string()]);
    record.fields.tags = Some(vec!["action".to_string()]);
    record.fields.description = Some(description);
    record.price_quotes = Some(vec![
        PriceQuote {
            platform_name: "PC".to_string(),
            price: Some(98.0),
            price_lowest: Some(49.0),
            ..PriceQuote::default()
        },
        PriceQuote {
            platform_name: "Switch".to_string(),
            is_free: true,
            ..PriceQuote::default()
        },
    ]);
    record.media_scores = Some(vec![
        MediaScore {
            media_name: "IGN".to_string(),
            score: Some(9.0),
            total_score: Some(10.0),
            content_url: None,
        },
        MediaScore {
            media_name: "Metacritic".to_string(),
            score: Some(87.0),
            total_score: Some(100.0),
            content_url: None,
        },
        MediaScore {
            media_name: "Famitsu".to_string(),
            score: Some(36.0),
            total_score: Some(40.0),
            content_url: None,
        },
        MediaScore {
            media_name: "Blog".to_string(),
            score: Some(7.3),
            total_score: None,
            content_url: None,
        },
    ]);
    record.reviews = Some(
        reviews
            .into_iter()
            .enumerate()
            .map(|(index, content)| ReviewRecord {
                external_comment_id: index as i64 + 1,
                content,
                ..ReviewRecord::default()
            })
            .collect(),
    );

    let cleaned = clean(record).expect("clean should succeed");
    (cleaned.item, cleaned.relations)
}

#[test]
fn embedding_text_has_every_section_in_order() {
    let (item, relations) = embedding_fixture(
        "Short description".to_string(),
        vec!["great".to_string(), "fun".to_string(), "meh".to_string()],
    );

    let text = extract_embedding_text(&item, &relations, 2);

    let expected = [
        "Title: Starfall",
        "English title: Starfall EN",
        "Platforms: PC, Switch",
        "Tags: action",
        "Prices: PC: ¥98, lowest ¥49; Switch: free",
        "Description: Short description",
        "Media scores: IGN 9.0/10, Metacritic 87/100, Famitsu 36.0/40, Blog 7.3",
        "Reviews: great | fun",
    ]
    .join("\n");
    assert_eq!(text, expected);
}

#[test]
fn embedding_text_is_deterministic() {
    let (item, relations) = embedding_fixture("Same".to_string(), vec!["one".to_string()]);

    let first = extract_embedding_text(&item, &relations, 5);
    let second = extract_embedding_text(&item, &relations, 5);
    assert_eq!(first, second);
}

#[test]
fn embedding_text_truncates_at_exact_character_limit() {
    let at_limit = "é".repeat(500);
    let over_limit = "é".repeat(501);
    let review_at_limit = "字".repeat(200);
    let review_over_limit = "字".repeat(201);

    let (item, relations) = embedding_fixture(at_limit.clone(), vec![review_at_limit.clone()]);
    let text = extract_embedding_text(&item, &relations, 5);
    assert!(text.contains(&format!("Description: {}\n", at_limit)));
    assert!(text.ends_with(&format!("Reviews: {}", review_at_limit)));

    let (item, relations) = embedding_fixture(over_limit, vec![review_over_limit]);
    let text = extract_embedding_text(&item, &relations, 5);
    assert!(text.contains(&format!("Description: {}...\n", at_limit)));
    assert!(text.ends_with(&format!("Reviews: {}...", review_at_limit)));
}

#[test]
fn embedding_text_with_only_title() {
    let cleaned = clean(merged(Some(1), Some("Lonely"))).expect("clean should succeed");
    let text = extract_embedding_text(&cleaned.item, &cleaned.relations, 5);
    assert_eq!(text, "Title: Lonely");
}

#[test]
fn empty_reviews_do_not_use_up_the_review_limit() {
    let (item, mut relations) = embedding_fixture("Short".to_string(), Vec::new());
    relations.reviews = ["", "a", "b"]
        .into_iter()
        .enumerate()
        .map(|(index, content)| ReviewRecord {
            external_comment_id: index as i64 + 1,
            content: content.to_string(),
            ..ReviewRecord::default()
        })
        .collect();

    let text = extract_embedding_text(&item, &relations, 2);
    assert!(text.ends_with("Reviews: a | b"), "unexpected text: {}", text);
}
