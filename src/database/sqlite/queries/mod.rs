
use super::models::{
    EmbeddingRow, GameKey, GameRow, MediaScoreRow, PriceRow, ReviewRow, encode_vector,
};
use crate::Result;
use crate::catalog::models::{CanonicalItem, MediaScore, PriceQuote, ReviewRecord};
use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

pub struct GameQueries;

impl GameQueries {
    #[inline]
    pub async fn find_id_by_external_id(
        conn: &mut SqliteConnection,
        external_id: i64,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM games WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(id)
    }

    #[inline]
    pub async fn insert(
        conn: &mut SqliteConnection,
        item: &CanonicalItem,
        now: NaiveDateTime,
    ) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO games (
                external_id, title, title_english, developer_name, publisher_name,
                description_html, description, cover_image_url, thumbnail_url,
                horizontal_image_url, platforms, platform_ids, tags, publish_date,
                publish_timestamp, steam_game_id, steam_praise_rate, steam_header_image,
                device_requirement_html, theme_color, hot_value, official_chinese,
                play_hours_caption, is_free, price, price_original, user_score,
                score_users_count, playeds_count, want_plays_count, real_players_score,
                real_players_count, source, raw_data, created_at, updated_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(item.external_id)
        .bind(&item.title)
        .bind(&item.title_english)
        .bind(&item.developer_name)
        .bind(&item.publisher_name)
        .bind(&item.description_html)
        .bind(&item.description)
        .bind(&item.cover_image_url)
        .bind(&item.thumbnail_url)
        .bind(&item.horizontal_image_url)
        .bind(Json(&item.platforms))
        .bind(Json(&item.platform_ids))
        .bind(Json(&item.tags))
        .bind(&item.publish_date)
        .bind(item.publish_timestamp)
        .bind(&item.steam_game_id)
        .bind(item.steam_praise_rate)
        .bind(&item.steam_header_image)
        .bind(&item.device_requirement_html)
        .bind(&item.theme_color)
        .bind(&item.hot_value)
        .bind(item.official_chinese)
        .bind(&item.play_hours_caption)
        .bind(item.is_free)
        .bind(item.price)
        .bind(item.price_original)
        .bind(item.user_score)
        .bind(item.score_users_count)
        .bind(item.playeds_count)
        .bind(item.want_plays_count)
        .bind(item.real_players_score)
        .bind(item.real_players_count)
        .bind(&item.source)
        .bind(Json(&item.raw_data))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        debug!("Inserted game {} as id {}", item.external_id, id);
        Ok(id)
    }

    /// Overwrite every column except `external_id` and `created_at`
    #[inline]
    pub async fn update(
        conn: &mut SqliteConnection,
        id: i64,
        item: &CanonicalItem,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE games SET
                title = ?, title_english = ?, developer_name = ?, publisher_name = ?,
                description_html = ?, description = ?, cover_image_url = ?,
                thumbnail_url = ?, horizontal_image_url = ?, platforms = ?,
                platform_ids = ?, tags = ?, publish_date = ?, publish_timestamp = ?,
                steam_game_id = ?, steam_praise_rate = ?, steam_header_image = ?,
                device_requirement_html = ?, theme_color = ?, hot_value = ?,
                official_chinese = ?, play_hours_caption = ?, is_free = ?, price = ?,
                price_original = ?, user_score = ?, score_users_count = ?,
                playeds_count = ?, want_plays_count = ?, real_players_score = ?,
                real_players_count = ?, source = ?, raw_data = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.title)
        .bind(&item.title_english)
        .bind(&item.developer_name)
        .bind(&item.publisher_name)
        .bind(&item.description_html)
        .bind(&item.description)
        .bind(&item.cover_image_url)
        .bind(&item.thumbnail_url)
        .bind(&item.horizontal_image_url)
        .bind(Json(&item.platforms))
        .bind(Json(&item.platform_ids))
        .bind(Json(&item.tags))
        .bind(&item.publish_date)
        .bind(item.publish_timestamp)
        .bind(&item.steam_game_id)
        .bind(item.steam_praise_rate)
        .bind(&item.steam_header_image)
        .bind(&item.device_requirement_html)
        .bind(&item.theme_color)
        .bind(&item.hot_value)
        .bind(item.official_chinese)
        .bind(&item.play_hours_caption)
        .bind(item.is_free)
        .bind(item.price)
        .bind(item.price_original)
        .bind(item.user_score)
        .bind(item.score_users_count)
        .bind(item.playeds_count)
        .bind(item.want_plays_count)
        .bind(item.real_players_score)
        .bind(item.real_players_count)
        .bind(&item.source)
        .bind(Json(&item.raw_data))
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        debug!("Updated game {} (id {})", item.external_id, id);
        Ok(())
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<GameRow>> {
        let row = sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    #[inline]
    pub async fn get_by_external_id(
        pool: &SqlitePool,
        external_id: i64,
    ) -> Result<Option<GameRow>> {
        let row = sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    /// Stored games ordered by id, optionally capped
    #[inline]
    pub async fn list_keys(pool: &SqlitePool, limit: Option<i64>) -> Result<Vec<GameKey>> {
        let keys = sqlx::query_as::<_, GameKey>(
            "SELECT id, external_id FROM games ORDER BY id LIMIT ?",
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await?;
        Ok(keys)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM games")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

pub struct RelationQueries;

impl RelationQueries {
    #[inline]
    pub async fn rank_membership_exists(
        conn: &mut SqliteConnection,
        game_id: i64,
        rank_id: i64,
    ) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM game_rank_relations WHERE game_id = ? AND rank_id = ?",
        )
        .bind(game_id)
        .bind(rank_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(found.is_some())
    }

    #[inline]
    pub async fn insert_rank_membership(
        conn: &mut SqliteConnection,
        game_id: i64,
        rank_id: i64,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query("INSERT INTO game_rank_relations (game_id, rank_id, created_at) VALUES (?, ?, ?)")
            .bind(game_id)
            .bind(rank_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    #[inline]
    pub async fn find_price_id(
        conn: &mut SqliteConnection,
        game_id: i64,
        platform_name: &str,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar(
            "SELECT id FROM game_prices WHERE game_id = ? AND platform_name = ?",
        )
        .bind(game_id)
        .bind(platform_name)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(id)
    }

    #[inline]
    pub async fn insert_price(
        conn: &mut SqliteConnection,
        game_id: i64,
        quote: &PriceQuote,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO game_prices (
                game_id, platform_name, price, price_lowest, price_original,
                sale_price_rate, is_free, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(game_id)
        .bind(&quote.platform_name)
        .bind(quote.price)
        .bind(quote.price_lowest)
        .bind(quote.price_original)
        .bind(quote.sale_price_rate)
        .bind(quote.is_free)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn update_price(
        conn: &mut SqliteConnection,
        id: i64,
        quote: &PriceQuote,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE game_prices SET
                price = ?, price_lowest = ?, price_original = ?, sale_price_rate = ?,
                is_free = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(quote.price)
        .bind(quote.price_lowest)
        .bind(quote.price_original)
        .bind(quote.sale_price_rate)
        .bind(quote.is_free)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn find_media_score_id(
        conn: &mut SqliteConnection,
        game_id: i64,
        media_name: &str,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar(
            "SELECT id FROM game_media_scores WHERE game_id = ? AND media_name = ?",
        )
        .bind(game_id)
        .bind(media_name)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(id)
    }

    #[inline]
    pub async fn insert_media_score(
        conn: &mut SqliteConnection,
        game_id: i64,
        media: &MediaScore,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO game_media_scores (
                game_id, media_name, score, total_score, content_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(game_id)
        .bind(&media.media_name)
        .bind(media.score)
        .bind(media.total_score)
        .bind(&media.content_url)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn update_media_score(
        conn: &mut SqliteConnection,
        id: i64,
        media: &MediaScore,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE game_media_scores SET score = ?, total_score = ?, content_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(media.score)
        .bind(media.total_score)
        .bind(&media.content_url)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Reviews are keyed globally by their upstream comment id
    #[inline]
    pub async fn find_review_id(
        conn: &mut SqliteConnection,
        external_comment_id: i64,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM reviews WHERE external_comment_id = ?")
            .bind(external_comment_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(id)
    }

    #[inline]
    pub async fn insert_review(
        conn: &mut SqliteConnection,
        game_id: i64,
        review: &ReviewRecord,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (
                game_id, external_comment_id, ordernum, content, content_html, rating,
                publish_time, praises_count, replies_count, treads_count,
                game_label_platform_names, content_user_label_type_names, author_user_id,
                author_name, author_head_image_url, raw_data, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(game_id)
        .bind(review.external_comment_id)
        .bind(review.ordernum)
        .bind(&review.content)
        .bind(&review.content_html)
        .bind(review.rating)
        .bind(&review.publish_time)
        .bind(review.praises_count)
        .bind(review.replies_count)
        .bind(review.treads_count)
        .bind(Json(&review.game_label_platform_names))
        .bind(Json(&review.content_user_label_type_names))
        .bind(review.author_user_id)
        .bind(&review.author_name)
        .bind(&review.author_head_image_url)
        .bind(review.raw_data.as_ref().map(Json))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn update_review(
        conn: &mut SqliteConnection,
        id: i64,
        game_id: i64,
        review: &ReviewRecord,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE reviews SET
                game_id = ?, ordernum = ?, content = ?, content_html = ?, rating = ?,
                publish_time = ?, praises_count = ?, replies_count = ?, treads_count = ?,
                game_label_platform_names = ?, content_user_label_type_names = ?,
                author_user_id = ?, author_name = ?, author_head_image_url = ?,
                raw_data = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(game_id)
        .bind(review.ordernum)
        .bind(&review.content)
        .bind(&review.content_html)
        .bind(review.rating)
        .bind(&review.publish_time)
        .bind(review.praises_count)
        .bind(review.replies_count)
        .bind(review.treads_count)
        .bind(Json(&review.game_label_platform_names))
        .bind(Json(&review.content_user_label_type_names))
        .bind(review.author_user_id)
        .bind(&review.author_name)
        .bind(&review.author_head_image_url)
        .bind(review.raw_data.as_ref().map(Json))
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn rank_ids_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT rank_id FROM game_rank_relations WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    #[inline]
    pub async fn prices_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<PriceRow>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT * FROM game_prices WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    #[inline]
    pub async fn media_scores_for_game(
        pool: &SqlitePool,
        game_id: i64,
    ) -> Result<Vec<MediaScoreRow>> {
        let rows = sqlx::query_as::<_, MediaScoreRow>(
            "SELECT * FROM game_media_scores WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    #[inline]
    pub async fn reviews_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<ReviewRow>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM reviews WHERE game_id = ? ORDER BY ordernum, id",
        )
        .bind(game_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

pub struct EmbeddingQueries;

impl EmbeddingQueries {
    /// Insert or replace the single embedding row of a game
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        game_id: i64,
        model: &str,
        vector: &[f32],
        text: &str,
        now: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO game_embeddings (
                game_id, model, dimension, embedding, embedding_text, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_id) DO UPDATE SET
                model = excluded.model,
                dimension = excluded.dimension,
                embedding = excluded.embedding,
                embedding_text = excluded.embedding_text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(game_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(encode_vector(vector))
        .bind(text)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn get_for_game(pool: &SqlitePool, game_id: i64) -> Result<Option<EmbeddingRow>> {
        let row = sqlx::query_as::<_, EmbeddingRow>(
            "SELECT * FROM game_embeddings WHERE game_id = ?",
        )
        .bind(game_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Games that have no embedding row yet, ordered by id
    #[inline]
    pub async fn games_without_embedding(
        pool: &SqlitePool,
        limit: Option<i64>,
    ) -> Result<Vec<GameKey>> {
        let keys = sqlx::query_as::<_, GameKey>(
            r#"
            SELECT g.id, g.external_id FROM games g
            LEFT JOIN game_embeddings e ON e.game_id = g.id
            WHERE e.id IS NULL
            ORDER BY g.id
            LIMIT ?
            "#,
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await?;
        Ok(keys)
    }
}

pub struct SchemaQueries;

impl SchemaQueries {
    /// Names of the user tables present in the database
    #[inline]
    pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar(
            r"SELECT name FROM sqlite_master
              WHERE type = 'table'
                AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
                AND name NOT LIKE '\_sqlx\_%' ESCAPE '\'
              ORDER BY name",
        )
        .fetch_all(pool)
        .await?;
        Ok(tables)
    }
}
