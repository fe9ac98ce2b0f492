use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptive fields shared by the summary (rank list) and detail endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameFields {
    pub external_id: Option<i64>,
    pub title: Option<String>,
    pub title_english: Option<String>,
    pub developer_name: Option<String>,
    pub publisher_name: Option<String>,
    pub description_html: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub horizontal_image_url: Option<String>,
    pub platforms: Option<Vec<String>>,
    pub platform_ids: Option<Vec<i64>>,
    pub tags: Option<Vec<String>>,
    pub publish_date: Option<String>,
    pub publish_timestamp: Option<i64>,
    pub steam_game_id: Option<String>,
    pub steam_praise_rate: Option<f64>,
    pub steam_header_image: Option<String>,
    pub device_requirement_html: Option<String>,
    pub theme_color: Option<String>,
    pub hot_value: Option<String>,
    pub official_chinese: Option<bool>,
    pub play_hours_caption: Option<String>,
}

/// Score counters as reported by the summary endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFields {
    pub user_score: Option<f64>,
    pub score_users_count: Option<i64>,
    pub playeds_count: Option<i64>,
    pub want_plays_count: Option<i64>,
    pub real_players_score: Option<f64>,
    pub real_players_count: Option<i64>,
}

/// Headline price of an item, independent of platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFields {
    pub is_free: Option<bool>,
    pub price: Option<f64>,
    pub price_original: Option<f64>,
    pub price_lowest: Option<f64>,
    pub sale_price_rate: Option<f64>,
}

/// Price quote for one platform; keyed by `(game, platform_name)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub platform_name: String,
    pub price: Option<f64>,
    pub price_lowest: Option<f64>,
    pub price_original: Option<f64>,
    pub sale_price_rate: Option<f64>,
    pub is_free: bool,
}

/// Score published by one outlet; keyed by `(game, media_name)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaScore {
    pub media_name: String,
    pub score: Option<f64>,
    pub total_score: Option<f64>,
    pub content_url: Option<String>,
}

/// A user review; keyed globally by `external_comment_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub external_comment_id: i64,
    pub ordernum: i64,
    pub content: String,
    pub content_html: Option<String>,
    pub rating: Option<f64>,
    pub publish_time: Option<String>,
    pub praises_count: i64,
    pub replies_count: i64,
    pub treads_count: i64,
    pub game_label_platform_names: Vec<String>,
    pub content_user_label_type_names: Vec<String>,
    pub author_user_id: Option<i64>,
    pub author_name: Option<String>,
    pub author_head_image_url: Option<String>,
    pub raw_data: Option<Value>,
}

/// Raw upstream payloads kept for audit, one slot per endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPayloads {
    pub summary: Option<Value>,
    pub detail: Option<Value>,
    pub scores: Option<Value>,
}

/// Partial record parsed from one rank list element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryPartial {
    pub fields: GameFields,
    pub scores: ScoreFields,
    pub pricing: PriceFields,
    pub price_quotes: Option<Vec<PriceQuote>>,
    pub media_scores: Option<Vec<MediaScore>>,
    pub reviews: Option<Vec<ReviewRecord>>,
    pub rank_ids: Vec<i64>,
    pub source: Option<String>,
    pub raw: RawPayloads,
}

/// Partial record parsed from the detail page endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPartial {
    pub fields: GameFields,
    pub price_quotes: Option<Vec<PriceQuote>>,
    pub media_scores: Option<Vec<MediaScore>>,
    pub raw: Value,
}

/// Partial record parsed from the score-and-reviews endpoint.
///
/// Score fields are tri-state: the outer `Option` tells whether the key was
/// present in the payload at all, the inner one carries an explicit null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScorePartial {
    pub external_id: Option<i64>,
    pub user_score: Option<Option<f64>>,
    pub score_users_count: Option<Option<i64>>,
    pub playeds_count: Option<Option<i64>>,
    pub want_plays_count: Option<Option<i64>>,
    pub real_players_score: Option<Option<f64>>,
    pub real_players_count: Option<Option<i64>>,
    pub reviews: Option<Vec<ReviewRecord>>,
    pub raw: Value,
}

/// Output of the merger, input of the cleaner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRecord {
    pub fields: GameFields,
    pub scores: ScoreFields,
    pub pricing: PriceFields,
    pub source: Option<String>,
    pub raw: RawPayloads,
    pub rank_ids: Vec<i64>,
    pub price_quotes: Option<Vec<PriceQuote>>,
    pub media_scores: Option<Vec<MediaScore>>,
    pub reviews: Option<Vec<ReviewRecord>>,
}

/// Merged and cleaned catalog entry, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub external_id: i64,
    pub title: String,
    pub title_english: Option<String>,
    pub developer_name: Option<String>,
    pub publisher_name: Option<String>,
    pub description_html: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub horizontal_image_url: Option<String>,
    pub platforms: Vec<String>,
    pub platform_ids: Vec<i64>,
    pub tags: Vec<String>,
    pub publish_date: Option<String>,
    pub publish_timestamp: Option<i64>,
    pub steam_game_id: Option<String>,
    pub steam_praise_rate: Option<f64>,
    pub steam_header_image: Option<String>,
    pub device_requirement_html: Option<String>,
    pub theme_color: Option<String>,
    pub hot_value: Option<String>,
    pub official_chinese: Option<bool>,
    pub play_hours_caption: Option<String>,
    pub is_free: bool,
    pub price: Option<f64>,
    pub price_original: Option<f64>,
    pub user_score: Option<f64>,
    pub score_users_count: Option<i64>,
    pub playeds_count: Option<i64>,
    pub want_plays_count: Option<i64>,
    pub real_players_score: Option<f64>,
    pub real_players_count: Option<i64>,
    pub source: String,
    pub raw_data: RawPayloads,
}

/// Child-table rows that travel with a canonical item during one fetch cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationBundle {
    pub rank_ids: Vec<i64>,
    pub price_quotes: Vec<PriceQuote>,
    pub media_scores: Vec<MediaScore>,
    pub reviews: Vec<ReviewRecord>,
}

impl RelationBundle {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rank_ids.is_empty()
            && self.price_quotes.is_empty()
            && self.media_scores.is_empty()
            && self.reviews.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub item: CanonicalItem,
    pub relations: RelationBundle,
}

impl From<&CleanedRecord> for SummaryPartial {
    /// Rebuild a summary partial carrying every value of an already cleaned
    /// record, so the record can be fed back through merge and clean.
    fn from(record: &CleanedRecord) -> Self {
        let item = &record.item;
        Self {
            fields: GameFields {
                external_id: Some(item.external_id),
                title: Some(item.title.clone()),
                title_english: item.title_english.clone(),
                developer_name: item.developer_name.clone(),
                publisher_name: item.publisher_name.clone(),
                description_html: item.description_html.clone(),
                description: item.description.clone(),
                cover_image_url: item.cover_image_url.clone(),
                thumbnail_url: item.thumbnail_url.clone(),
                horizontal_image_url: item.horizontal_image_url.clone(),
                platforms: Some(item.platforms.clone()),
                platform_ids: Some(item.platform_ids.clone()),
                tags: Some(item.tags.clone()),
                publish_date: item.publish_date.clone(),
                publish_timestamp: item.publish_timestamp,
                steam_game_id: item.steam_game_id.clone(),
                steam_praise_rate: item.steam_praise_rate,
                steam_header_image: item.steam_header_image.clone(),
                device_requirement_html: item.device_requirement_html.clone(),
                theme_color: item.theme_color.clone(),
                hot_value: item.hot_value.clone(),
                official_chinese: item.official_chinese,
                play_hours_caption: item.play_hours_caption.clone(),
            },
            scores: ScoreFields {
                user_score: item.user_score,
                score_users_count: item.score_users_count,
                playeds_count: item.playeds_count,
                want_plays_count: item.want_plays_count,
                real_players_score: item.real_players_score,
                real_players_count: item.real_players_count,
            },
            pricing: PriceFields {
                is_free: Some(item.is_free),
                price: item.price,
                price_original: item.price_original,
                price_lowest: None,
                sale_price_rate: None,
            },
            price_quotes: Some(record.relations.price_quotes.clone()),
            media_scores: Some(record.relations.media_scores.clone()),
            reviews: Some(record.relations.reviews.clone()),
            rank_ids: record.relations.rank_ids.clone(),
            source: Some(item.source.clone()),
            raw: item.raw_data.clone(),
        }
    }
}
