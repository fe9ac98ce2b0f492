#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::hash::Hash;

use super::models::{
    CanonicalItem, CleanedRecord, MediaScore, MergedRecord, PriceQuote, RelationBundle,
    ReviewRecord,
};
use crate::{IngestError, Result};

/// Source tag applied when the merged record carries none
pub const DEFAULT_SOURCE: &str = "external";

const MAX_USER_SCORE: f64 = 10.0;
const DESCRIPTION_LIMIT: usize = 500;
const REVIEW_LIMIT: usize = 200;
const ELLIPSIS: &str = "...";

/// Normalize, validate and fill defaults on a merged record.
///
/// Only a missing external id or title is an error; every other anomaly is
/// repaired or dropped. Applying `clean` to the output of a previous `clean`
/// yields the same record.
#[inline]
pub fn clean(merged: MergedRecord) -> Result<CleanedRecord> {
    let MergedRecord {
        fields,
        scores,
        pricing,
        source,
        raw,
        rank_ids,
        price_quotes,
        media_scores,
        reviews,
    } = merged;

    let external_id = fields
        .external_id
        .filter(|id| *id != 0)
        .ok_or_else(|| IngestError::Validation("external_id is required".to_string()))?;
    let title = clean_text(fields.title).ok_or_else(|| {
        IngestError::Validation(format!("title is required (external_id {})", external_id))
    })?;

    let item = CanonicalItem {
        external_id,
        title,
        title_english: clean_text(fields.title_english),
        developer_name: clean_text(fields.developer_name),
        publisher_name: clean_text(fields.publisher_name),
        description_html: clean_text(fields.description_html),
        description: clean_text(fields.description),
        cover_image_url: clean_text(fields.cover_image_url),
        thumbnail_url: clean_text(fields.thumbnail_url),
        horizontal_image_url: clean_text(fields.horizontal_image_url),
        platforms: clean_list(fields.platforms),
        platform_ids: dedup_by_key(fields.platform_ids.unwrap_or_default(), |id| *id),
        tags: clean_list(fields.tags),
        publish_date: clean_text(fields.publish_date),
        publish_timestamp: fields.publish_timestamp,
        steam_game_id: clean_text(fields.steam_game_id),
        steam_praise_rate: fields.steam_praise_rate.filter(|rate| rate.is_finite()),
        steam_header_image: clean_text(fields.steam_header_image),
        device_requirement_html: clean_text(fields.device_requirement_html),
        theme_color: clean_text(fields.theme_color),
        hot_value: clean_text(fields.hot_value),
        official_chinese: fields.official_chinese,
        play_hours_caption: clean_text(fields.play_hours_caption),
        is_free: pricing.is_free.unwrap_or(false),
        price: clamp_price(pricing.price),
        price_original: clamp_price(pricing.price_original),
        user_score: clamp_score(scores.user_score),
        score_users_count: scores.score_users_count,
        playeds_count: scores.playeds_count,
        want_plays_count: scores.want_plays_count,
        real_players_score: scores.real_players_score.filter(|score| score.is_finite()),
        real_players_count: scores.real_players_count,
        source: clean_text(source).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        raw_data: raw,
    };

    let relations = RelationBundle {
        rank_ids: dedup_by_key(rank_ids, |id| *id),
        price_quotes: clean_price_quotes(price_quotes.unwrap_or_default()),
        media_scores: clean_media_scores(media_scores.unwrap_or_default()),
        reviews: clean_reviews(reviews.unwrap_or_default()),
    };

    Ok(CleanedRecord { item, relations })
}

fn clean_text(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn clean_list(values: Option<Vec<String>>) -> Vec<String> {
    let values = values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| clean_text(Some(value)))
        .collect();
    dedup_by_key(values, Clone::clone)
}

fn clamp_score(score: Option<f64>) -> Option<f64> {
    match score {
        Some(value) if !value.is_finite() || value < 0.0 => None,
        Some(value) => Some(value.min(MAX_USER_SCORE)),
        None => None,
    }
}

fn clamp_price(price: Option<f64>) -> Option<f64> {
    price
        .filter(|value| value.is_finite())
        .map(|value| value.max(0.0))
}

/// Keep the first occurrence of every key, preserving order
fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

fn clean_price_quotes(quotes: Vec<PriceQuote>) -> Vec<PriceQuote> {
    let quotes = quotes
        .into_iter()
        .filter_map(|mut quote| {
            quote.platform_name = clean_text(Some(quote.platform_name))?;
            quote.price = clamp_price(quote.price);
            quote.price_lowest = clamp_price(quote.price_lowest);
            quote.price_original = clamp_price(quote.price_original);
            Some(quote)
        })
        .collect();
    dedup_by_key(quotes, |quote: &PriceQuote| quote.platform_name.clone())
}

fn clean_media_scores(scores: Vec<MediaScore>) -> Vec<MediaScore> {
    let scores = scores
        .into_iter()
        .filter_map(|mut score| {
            score.media_name = clean_text(Some(score.media_name))?;
            score.content_url = clean_text(score.content_url);
            Some(score)
        })
        .collect();
    dedup_by_key(scores, |score: &MediaScore| score.media_name.clone())
}

fn clean_reviews(reviews: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
    let reviews = reviews
        .into_iter()
        .filter(|review| review.external_comment_id != 0)
        .map(|mut review| {
            review.content = review.content.trim().to_string();
            review.author_name = clean_text(review.author_name);
            review
        })
        .collect();
    dedup_by_key(reviews, |review: &ReviewRecord| review.external_comment_id)
}

/// Build the text handed to the embedding collaborator.
///
/// Output depends only on the arguments. Lines appear in a fixed order and
/// empty sections are omitted.
#[inline]
pub fn extract_embedding_text(
    item: &CanonicalItem,
    relations: &RelationBundle,
    max_reviews: usize,
) -> String {
    let mut lines = vec![format!("Title: {}", item.title)];

    if let Some(english) = &item.title_english {
        lines.push(format!("English title: {}", english));
    }
    if !item.platforms.is_empty() {
        lines.push(format!("Platforms: {}", item.platforms.join(", ")));
    }
    if !item.tags.is_empty() {
        lines.push(format!("Tags: {}", item.tags.join(", ")));
    }

    let prices: Vec<String> = relations.price_quotes.iter().map(format_price).collect();
    if !prices.is_empty() {
        lines.push(format!("Prices: {}", prices.join("; ")));
    }

    if let Some(description) = &item.description {
        lines.push(format!(
            "Description: {}",
            truncate_chars(description, DESCRIPTION_LIMIT)
        ));
    }

    let media: Vec<String> = relations
        .media_scores
        .iter()
        .filter_map(format_media_score)
        .collect();
    if !media.is_empty() {
        lines.push(format!("Media scores: {}", media.join(", ")));
    }

    let reviews: Vec<String> = relations
        .reviews
        .iter()
        .filter(|review| !review.content.is_empty())
        .take(max_reviews)
        .map(|review| truncate_chars(&review.content, REVIEW_LIMIT))
        .collect();
    if !reviews.is_empty() {
        lines.push(format!("Reviews: {}", reviews.join(" | ")));
    }

    lines.join("\n")
}

fn format_price(quote: &PriceQuote) -> String {
    if quote.is_free {
        return format!("{}: free", quote.platform_name);
    }

    let price = quote.price.unwrap_or(0.0);
    match quote.price_lowest.filter(|low| *low > 0.0 && *low < price) {
        Some(lowest) => format!("{}: ¥{}, lowest ¥{}", quote.platform_name, price, lowest),
        None => format!("{}: ¥{}", quote.platform_name, price),
    }
}

fn format_media_score(media: &MediaScore) -> Option<String> {
    let score = media.score?;
    let formatted = match media.total_score.filter(|total| *total != 0.0) {
        Some(total) if total == 10.0 => format!("{:.1}/10", score),
        Some(total) if total == 100.0 => format!("{:.0}/100", score),
        Some(total) => format!("{:.1}/{:.0}", score, total),
        None => format!("{:.1}", score),
    };
    Some(format!("{} {}", media.media_name, formatted))
}

/// Cut `text` to at most `limit` characters, marking the cut with an ellipsis
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
