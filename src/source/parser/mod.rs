//! Pure conversion of raw upstream JSON into typed partial records.
//!
//! Nothing here fails: missing or mistyped fields become `None`, a list field
//! holding a non-array becomes an empty list, and HTML that cannot be reduced
//! to text is kept as is.


use anyhow::anyhow;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::warn;

use crate::catalog::models::{
    DetailPartial, GameFields, MediaScore, PriceFields, PriceQuote, RawPayloads, ReviewRecord,
    ScoreFields, ScorePartial, SummaryPartial,
};

/// Parse one element of a rank list page.
///
/// Returns `None` for elements that carry no `gameInfo` object (ads, banners).
#[inline]
pub fn parse_summary(element: &Value) -> Option<SummaryPartial> {
    let game = element.get("gameInfo").filter(|info| info.is_object())?;

    let mut fields = game_fields(game);
    let mut pricing = PriceFields::default();

    for tag in array_items(element.get("gameCardTags")) {
        match tag.get("showType").and_then(Value::as_str) {
            Some("priceInfo") if pricing == PriceFields::default() => {
                if let Some(info) = tag.get("priceInfo").filter(|info| is_non_empty_object(info)) {
                    pricing = PriceFields {
                        is_free: Some(bool_field(info, "beFree").unwrap_or(false)),
                        price: float_field(info, "price"),
                        price_original: float_field(info, "priceOriginal"),
                        price_lowest: float_field(info, "priceLowest"),
                        sale_price_rate: float_field(info, "salePriceRate"),
                    };
                }
            }
            Some("hotValue") => fields.hot_value = text_field(tag, "showContent"),
            _ => {}
        }
    }

    let scores = game
        .get("scoreInfo")
        .filter(|info| is_non_empty_object(info))
        .map(|info| ScoreFields {
            user_score: float_field(info, "userScore"),
            score_users_count: int_field(info, "scoreUsersCount"),
            playeds_count: int_field(info, "playedsCount"),
            want_plays_count: int_field(info, "wantPlaysCount"),
            ..ScoreFields::default()
        })
        .unwrap_or_default();

    Some(SummaryPartial {
        fields,
        scores,
        pricing,
        price_quotes: price_quotes(game),
        media_scores: None,
        reviews: None,
        rank_ids: Vec::new(),
        source: None,
        raw: RawPayloads {
            summary: Some(element.clone()),
            ..RawPayloads::default()
        },
    })
}

/// Parse the payload of the detail page endpoint.
///
/// Returns `None` when the payload has no `game` object.
#[inline]
pub fn parse_detail(payload: &Value) -> Option<DetailPartial> {
    let game = payload.get("game").filter(|game| is_non_empty_object(game))?;

    let media_scores = non_empty_array(game.get("mediaInfes")).map(|entries| {
        entries
            .iter()
            .map(|entry| MediaScore {
                media_name: text_field(entry, "mediaName").unwrap_or_default(),
                score: float_field(entry, "score"),
                total_score: float_field(entry, "totalScore"),
                content_url: text_field(entry, "contentUrl"),
            })
            .collect()
    });

    Some(DetailPartial {
        fields: game_fields(game),
        price_quotes: price_quotes(game),
        media_scores,
        raw: game.clone(),
    })
}

/// Parse the payload of the score-and-reviews endpoint.
///
/// Score keys are reported as present, possibly null, whenever the payload
/// carries a `gameScoreInfo` object. Reviews are numbered from 1 in payload
/// order.
#[inline]
pub fn parse_scores(payload: &Value) -> ScorePartial {
    let mut partial = ScorePartial {
        external_id: int_field(payload, "gameId"),
        raw: payload.clone(),
        ..ScorePartial::default()
    };

    if let Some(info) = payload
        .get("gameScoreInfo")
        .filter(|info| is_non_empty_object(info))
    {
        partial.user_score = Some(float_field(info, "userScore"));
        partial.score_users_count = Some(int_field(info, "scoreUsersCount"));
        partial.playeds_count = Some(int_field(info, "playedsCount"));
        partial.want_plays_count = Some(int_field(info, "wantPlaysCount"));
        partial.real_players_score = Some(float_field(info, "realPlayersScore"));
        partial.real_players_count = Some(int_field(info, "realPlayersCount"));
    }

    if let Some(elements) = payload.get("listElements").filter(|list| !list.is_null()) {
        partial.reviews = Some(
            array_items(Some(elements))
                .enumerate()
                .filter_map(|(index, element)| parse_review(element, index as i64 + 1))
                .collect(),
        );
    }

    partial
}

fn parse_review(element: &Value, ordernum: i64) -> Option<ReviewRecord> {
    let comment = element
        .get("commentInfo")
        .filter(|comment| is_non_empty_object(comment))?;
    let content_html = text_field(comment, "contentInHtml");

    Some(ReviewRecord {
        external_comment_id: int_field(comment, "id").unwrap_or_default(),
        ordernum,
        content: content_html
            .as_deref()
            .map(html_to_text)
            .unwrap_or_default(),
        content_html,
        rating: float_field(comment, "contentScore"),
        publish_time: text_field(comment, "publishTimeCaption"),
        praises_count: int_field(comment, "praisesCount").unwrap_or_default(),
        replies_count: int_field(comment, "repliesCount").unwrap_or_default(),
        treads_count: int_field(comment, "treadsCount").unwrap_or_default(),
        game_label_platform_names: string_list(comment.get("gameLabelPlatformNames"))
            .unwrap_or_default(),
        content_user_label_type_names: string_list(comment.get("contentUserLabelTypeNames"))
            .unwrap_or_default(),
        author_user_id: int_field(element, "authorUserId"),
        author_name: text_field(element, "authorName"),
        author_head_image_url: text_field(element, "authorHeadImageUrl"),
        raw_data: Some(comment.clone()),
    })
}

/// Fields shared by the rank list `gameInfo` object and the detail `game` object
fn game_fields(game: &Value) -> GameFields {
    let description_html = text_field(game, "detailInHtml");
    let (publish_date, publish_timestamp) = published_time(game);
    let steam = game.get("steamInfo").filter(|info| is_non_empty_object(info));

    GameFields {
        external_id: int_field(game, "id"),
        title: text_field(game, "title"),
        title_english: text_field(game, "titleInEnglish"),
        developer_name: text_field(game, "developerName"),
        publisher_name: text_field(game, "publisherName"),
        description: description_html.as_deref().map(html_to_text),
        description_html,
        cover_image_url: text_field(game, "coverImageUrl"),
        thumbnail_url: text_field(game, "thumbnailUrl"),
        horizontal_image_url: text_field(game, "horizontalImageUrl"),
        platforms: string_list(game.get("devicePlatformNames")),
        platform_ids: int_list(game.get("devicePlatformIds")),
        tags: tag_captions(game.get("tags")),
        publish_date,
        publish_timestamp,
        steam_game_id: steam.and_then(|info| text_field(info, "gameId")),
        steam_praise_rate: steam.and_then(|info| float_field(info, "praiseRate")),
        steam_header_image: steam.and_then(|info| text_field(info, "steamHeaderImage")),
        device_requirement_html: text_field(game, "deviceRequirementInHtml"),
        theme_color: text_field(game, "themeColor"),
        hot_value: None,
        official_chinese: bool_field(game, "beOfficialChineseEnable"),
        play_hours_caption: text_field(game, "playHoursCaption"),
    }
}

/// Date part and timestamp of the first published entry in `publishTimes`
fn published_time(game: &Value) -> (Option<String>, Option<i64>) {
    let Some(entry) = array_items(game.get("publishTimes"))
        .find(|entry| bool_field(entry, "isPublished").unwrap_or(false))
    else {
        return (None, None);
    };

    let date = text_field(entry, "publishTime")
        .and_then(|time| time.split('T').next().map(str::to_string))
        .filter(|date| !date.is_empty());
    (date, int_field(entry, "publishTimeStamp"))
}

fn price_quotes(game: &Value) -> Option<Vec<PriceQuote>> {
    non_empty_array(game.get("priceInfes")).map(|entries| {
        entries
            .iter()
            .map(|entry| PriceQuote {
                platform_name: text_field(entry, "platformName").unwrap_or_default(),
                price: float_field(entry, "price"),
                price_lowest: float_field(entry, "priceLowest"),
                price_original: float_field(entry, "priceOriginal"),
                sale_price_rate: float_field(entry, "salePriceRate"),
                is_free: bool_field(entry, "beFree").unwrap_or(false),
            })
            .collect()
    })
}

fn tag_captions(value: Option<&Value>) -> Option<Vec<String>> {
    value.filter(|tags| !tags.is_null()).map(|tags| {
        array_items(Some(tags))
            .filter_map(|tag| text_field(tag, "caption"))
            .filter(|caption| !caption.is_empty())
            .collect()
    })
}

/// Reduce an HTML fragment to its visible text.
///
/// Text nodes are trimmed and concatenated without separator. `<script>` and
/// `<style>` content is dropped. On failure the raw HTML is returned.
#[inline]
pub fn html_to_text(html: &str) -> String {
    match extract_text(html) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to extract text from HTML, keeping raw markup: {}", e);
            html.to_string()
        }
    }
}

fn extract_text(html: &str) -> anyhow::Result<String> {
    let mut fragment = Html::parse_fragment(html);
    let hidden = Selector::parse("script, style")
        .map_err(|e| anyhow!("Invalid selector: {:?}", e))?;

    let hidden_ids: Vec<_> = fragment.select(&hidden).map(|element| element.id()).collect();
    for node_id in hidden_ids {
        if let Some(mut node) = fragment.tree.get_mut(node_id) {
            node.detach();
        }
    }

    Ok(fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect())
}

fn array_items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flat_map(|items| items.iter())
}

fn non_empty_array(value: Option<&Value>) -> Option<&Vec<Value>> {
    value
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
}

fn is_non_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|object| !object.is_empty())
}

/// Present list field; a non-array value degrades to an empty list
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.filter(|list| !list.is_null()).map(|list| {
        array_items(Some(list))
            .filter_map(value_to_text)
            .collect()
    })
}

fn int_list(value: Option<&Value>) -> Option<Vec<i64>> {
    value
        .filter(|list| !list.is_null())
        .map(|list| array_items(Some(list)).filter_map(value_to_int).collect())
}

fn text_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(value_to_text)
}

fn int_field(object: &Value, key: &str) -> Option<i64> {
    object.get(key).and_then(value_to_int)
}

fn float_field(object: &Value, key: &str) -> Option<f64> {
    object.get(key).and_then(value_to_float)
}

fn bool_field(object: &Value, key: &str) -> Option<bool> {
    match object.get(key)? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|value| value != 0.0),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn value_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
