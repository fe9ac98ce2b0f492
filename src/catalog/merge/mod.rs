
use super::models::{DetailPartial, GameFields, MergedRecord, ScorePartial, SummaryPartial};

/// Combine the partials of one item into a single merged record.
///
/// Detail values win over summary values whenever they are present. Score
/// values win unconditionally when the score payload carried the key, even if
/// its value was null. Relation lists are replaced wholesale, never appended.
#[inline]
pub fn merge(
    summary: &SummaryPartial,
    detail: Option<&DetailPartial>,
    scores: Option<&ScorePartial>,
) -> MergedRecord {
    let mut merged = MergedRecord {
        fields: summary.fields.clone(),
        scores: summary.scores,
        pricing: summary.pricing,
        source: summary.source.clone(),
        raw: summary.raw.clone(),
        rank_ids: summary.rank_ids.clone(),
        price_quotes: summary.price_quotes.clone(),
        media_scores: summary.media_scores.clone(),
        reviews: summary.reviews.clone(),
    };

    if let Some(detail) = detail {
        overlay_fields(&mut merged.fields, &detail.fields);
        prefer(&mut merged.price_quotes, &detail.price_quotes);
        prefer(&mut merged.media_scores, &detail.media_scores);
        merged.raw.detail = Some(detail.raw.clone());
    }

    if let Some(scores) = scores {
        if merged.fields.external_id.is_none() {
            merged.fields.external_id = scores.external_id;
        }

        let target = &mut merged.scores;
        override_present(&mut target.user_score, scores.user_score);
        override_present(&mut target.score_users_count, scores.score_users_count);
        override_present(&mut target.playeds_count, scores.playeds_count);
        override_present(&mut target.want_plays_count, scores.want_plays_count);
        override_present(&mut target.real_players_score, scores.real_players_score);
        override_present(&mut target.real_players_count, scores.real_players_count);

        prefer(&mut merged.reviews, &scores.reviews);
        merged.raw.scores = Some(scores.raw.clone());
    }

    merged
}

/// Copy every present detail field over the summary value
fn overlay_fields(target: &mut GameFields, detail: &GameFields) {
    prefer(&mut target.external_id, &detail.external_id);
    prefer(&mut target.title, &detail.title);
    prefer(&mut target.title_english, &detail.title_english);
    prefer(&mut target.developer_name, &detail.developer_name);
    prefer(&mut target.publisher_name, &detail.publisher_name);
    prefer(&mut target.description_html, &detail.description_html);
    prefer(&mut target.description, &detail.description);
    prefer(&mut target.cover_image_url, &detail.cover_image_url);
    prefer(&mut target.thumbnail_url, &detail.thumbnail_url);
    prefer(&mut target.horizontal_image_url, &detail.horizontal_image_url);
    prefer(&mut target.platforms, &detail.platforms);
    prefer(&mut target.platform_ids, &detail.platform_ids);
    prefer(&mut target.tags, &detail.tags);
    prefer(&mut target.publish_date, &detail.publish_date);
    prefer(&mut target.publish_timestamp, &detail.publish_timestamp);
    prefer(&mut target.steam_game_id, &detail.steam_game_id);
    prefer(&mut target.steam_praise_rate, &detail.steam_praise_rate);
    prefer(&mut target.steam_header_image, &detail.steam_header_image);
    prefer(
        &mut target.device_requirement_html,
        &detail.device_requirement_html,
    );
    prefer(&mut target.theme_color, &detail.theme_color);
    prefer(&mut target.hot_value, &detail.hot_value);
    prefer(&mut target.official_chinese, &detail.official_chinese);
    prefer(&mut target.play_hours_caption, &detail.play_hours_caption);
}

fn prefer<T: Clone>(target: &mut Option<T>, candidate: &Option<T>) {
    if candidate.is_some() {
        target.clone_from(candidate);
    }
}

fn override_present<T>(target: &mut Option<T>, candidate: Option<Option<T>>) {
    if let Some(value) = candidate {
        *target = value;
    }
}
