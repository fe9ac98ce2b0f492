
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::catalog::models::{
    CanonicalItem, MediaScore, PriceQuote, RawPayloads, ReviewRecord,
};

pub const GAMES_TABLE: &str = "games";
pub const EMBEDDINGS_TABLE: &str = "game_embeddings";

/// Child tables reconciled alongside a game row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    RankMembership,
    Price,
    MediaScore,
    Review,
}

impl RelationKind {
    pub const ALL: [Self; 4] = [
        Self::RankMembership,
        Self::Price,
        Self::MediaScore,
        Self::Review,
    ];

    #[inline]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::RankMembership => "game_rank_relations",
            Self::Price => "game_prices",
            Self::MediaScore => "game_media_scores",
            Self::Review => "reviews",
        }
    }
}

impl std::fmt::Display for RelationKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::RankMembership => write!(f, "rank membership"),
            Self::Price => write!(f, "price"),
            Self::MediaScore => write!(f, "media score"),
            Self::Review => write!(f, "review"),
        }
    }
}

/// A stored game: the canonical item plus its internal id and timestamps
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct GameRow {
    pub id: i64,
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
    pub platforms: Json<Vec<String>>,
    pub platform_ids: Json<Vec<i64>>,
    pub tags: Json<Vec<String>>,
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
    pub raw_data: Option<Json<RawPayloads>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl GameRow {
    #[inline]
    pub fn into_item(self) -> CanonicalItem {
        CanonicalItem {
            external_id: self.external_id,
            title: self.title,
            title_english: self.title_english,
            developer_name: self.developer_name,
            publisher_name: self.publisher_name,
            description_html: self.description_html,
            description: self.description,
            cover_image_url: self.cover_image_url,
            thumbnail_url: self.thumbnail_url,
            horizontal_image_url: self.horizontal_image_url,
            platforms: self.platforms.0,
            platform_ids: self.platform_ids.0,
            tags: self.tags.0,
            publish_date: self.publish_date,
            publish_timestamp: self.publish_timestamp,
            steam_game_id: self.steam_game_id,
            steam_praise_rate: self.steam_praise_rate,
            steam_header_image: self.steam_header_image,
            device_requirement_html: self.device_requirement_html,
            theme_color: self.theme_color,
            hot_value: self.hot_value,
            official_chinese: self.official_chinese,
            play_hours_caption: self.play_hours_caption,
            is_free: self.is_free,
            price: self.price,
            price_original: self.price_original,
            user_score: self.user_score,
            score_users_count: self.score_users_count,
            playeds_count: self.playeds_count,
            want_plays_count: self.want_plays_count,
            real_players_score: self.real_players_score,
            real_players_count: self.real_players_count,
            source: self.source,
            raw_data: self.raw_data.map(|raw| raw.0).unwrap_or_default(),
        }
    }
}

/// Internal and external id of a stored game
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct GameKey {
    pub id: i64,
    pub external_id: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PriceRow {
    pub id: i64,
    pub game_id: i64,
    pub platform_name: String,
    pub price: Option<f64>,
    pub price_lowest: Option<f64>,
    pub price_original: Option<f64>,
    pub sale_price_rate: Option<f64>,
    pub is_free: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<PriceRow> for PriceQuote {
    #[inline]
    fn from(row: PriceRow) -> Self {
        Self {
            platform_name: row.platform_name,
            price: row.price,
            price_lowest: row.price_lowest,
            price_original: row.price_original,
            sale_price_rate: row.sale_price_rate,
            is_free: row.is_free,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct MediaScoreRow {
    pub id: i64,
    pub game_id: i64,
    pub media_name: String,
    pub score: Option<f64>,
    pub total_score: Option<f64>,
    pub content_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<MediaScoreRow> for MediaScore {
    #[inline]
    fn from(row: MediaScoreRow) -> Self {
        Self {
            media_name: row.media_name,
            score: row.score,
            total_score: row.total_score,
            content_url: row.content_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub game_id: i64,
    pub external_comment_id: i64,
    pub ordernum: i64,
    pub content: String,
    pub content_html: Option<String>,
    pub rating: Option<f64>,
    pub publish_time: Option<String>,
    pub praises_count: i64,
    pub replies_count: i64,
    pub treads_count: i64,
    pub game_label_platform_names: Json<Vec<String>>,
    pub content_user_label_type_names: Json<Vec<String>>,
    pub author_user_id: Option<i64>,
    pub author_name: Option<String>,
    pub author_head_image_url: Option<String>,
    pub raw_data: Option<Json<serde_json::Value>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<ReviewRow> for ReviewRecord {
    #[inline]
    fn from(row: ReviewRow) -> Self {
        Self {
            external_comment_id: row.external_comment_id,
            ordernum: row.ordernum,
            content: row.content,
            content_html: row.content_html,
            rating: row.rating,
            publish_time: row.publish_time,
            praises_count: row.praises_count,
            replies_count: row.replies_count,
            treads_count: row.treads_count,
            game_label_platform_names: row.game_label_platform_names.0,
            content_user_label_type_names: row.content_user_label_type_names.0,
            author_user_id: row.author_user_id,
            author_name: row.author_name,
            author_head_image_url: row.author_head_image_url,
            raw_data: row.raw_data.map(|raw| raw.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EmbeddingRow {
    pub id: i64,
    pub game_id: i64,
    pub model: String,
    pub dimension: i64,
    pub embedding: Vec<u8>,
    pub embedding_text: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl EmbeddingRow {
    /// Decode the stored little-endian `f32` vector
    #[inline]
    pub fn vector(&self) -> Vec<f32> {
        decode_vector(&self.embedding)
    }
}

#[inline]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

#[inline]
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
