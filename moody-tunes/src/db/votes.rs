//! Vote log database operations
//!
//! Retraction is logical: the row stays with `vote = 0`. Queries over
//! "current" votes deduplicate per song keeping the most recent row,
//! ordered by `created_at` then `id` (both descending).

use super::songs::song_from_row;
use super::users::parse_uuid;
use moody_common::db::{Song, Vote};
use moody_common::{time, Attributes, Emotion, Result, VoteContext};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteExecutor};
use uuid::Uuid;

/// Fields for a new vote row
#[derive(Debug, Clone)]
pub struct NewVote<'a> {
    pub user_id: Uuid,
    pub song_id: i64,
    pub emotion: Emotion,
    pub context: VoteContext,
    pub description: &'a str,
    pub vote: bool,
}

/// Optional narrowing applied to the current up-vote set
#[derive(Debug, Clone, Copy, Default)]
pub struct UpvoteFilter<'a> {
    pub genre: Option<&'a str>,
    pub context: Option<VoteContext>,
    pub artist: Option<&'a str>,
}

/// An up-voted song with the vote that put it on the playlist
#[derive(Debug, Clone, Serialize)]
pub struct UpvotedSong {
    pub song: Song,
    pub context: VoteContext,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregate of the current up-vote set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpvoteSummary {
    pub total: i64,
    pub center: Option<Attributes>,
}

pub async fn insert_vote<'e, E>(executor: E, vote: &NewVote<'_>) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO user_song_votes
            (user_id, song_id, emotion, context, description, vote, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(vote.user_id.to_string())
    .bind(vote.song_id)
    .bind(vote.emotion.code())
    .bind(vote.context.code())
    .bind(vote.description)
    .bind(vote.vote)
    .bind(time::now_millis())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Exact-key lookup
pub async fn find_vote<'e, E>(
    executor: E,
    user_id: Uuid,
    song_id: i64,
    emotion: Emotion,
    context: VoteContext,
) -> Result<Option<Vote>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT v.id, v.user_id, s.code AS song_code, v.emotion, v.context,
               v.description, v.vote, v.created_at
        FROM user_song_votes v
        JOIN songs s ON s.id = v.song_id
        WHERE v.user_id = ? AND v.song_id = ? AND v.emotion = ? AND v.context = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(song_id)
    .bind(emotion.code())
    .bind(context.code())
    .fetch_optional(executor)
    .await?;

    row.map(|r| vote_from_row(&r)).transpose()
}

/// Flip a retracted vote back to an up-vote; it counts as a fresh vote
pub async fn restore_upvote<'e, E>(executor: E, vote_id: i64, description: &str) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "UPDATE user_song_votes SET vote = 1, description = ?, created_at = ? WHERE id = ? AND vote = 0",
    )
    .bind(description)
    .bind(time::now_millis())
    .bind(vote_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Flip matching up-votes to false; `context = None` matches every context
///
/// Returns the number of rows retracted.
pub async fn retract_upvotes<'e, E>(
    executor: E,
    user_id: Uuid,
    song_id: i64,
    emotion: Emotion,
    context: Option<VoteContext>,
) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE user_song_votes SET vote = 0 WHERE vote = 1 AND user_id = ");
    builder.push_bind(user_id.to_string());
    builder.push(" AND song_id = ").push_bind(song_id);
    builder.push(" AND emotion = ").push_bind(emotion.code());
    if let Some(context) = context {
        builder.push(" AND context = ").push_bind(context.code());
    }

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}

/// Attributes of the `limit` most recent distinct-song up-votes
pub async fn recent_upvoted_attributes<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    limit: usize,
) -> Result<Vec<Attributes>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT s.energy, s.valence, s.danceability
        FROM (
            SELECT song_id, created_at, id,
                   ROW_NUMBER() OVER (
                       PARTITION BY song_id ORDER BY created_at DESC, id DESC
                   ) AS rn
            FROM user_song_votes
            WHERE user_id = ? AND emotion = ? AND vote = 1
        ) v
        JOIN songs s ON s.id = v.song_id
        WHERE v.rn = 1
        ORDER BY v.created_at DESC, v.id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(emotion.code())
    .bind(limit as i64)
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(attributes_from_row).collect())
}

/// Attributes of every distinct up-voted song for (emotion, context)
pub async fn context_upvoted_attributes<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    context: VoteContext,
) -> Result<Vec<Attributes>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT s.energy, s.valence, s.danceability
        FROM songs s
        WHERE s.id IN (
            SELECT song_id FROM user_song_votes
            WHERE user_id = ? AND emotion = ? AND context = ? AND vote = 1
        )
        "#,
    )
    .bind(user_id.to_string())
    .bind(emotion.code())
    .bind(context.code())
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(attributes_from_row).collect())
}

fn push_current_upvotes<'a>(
    builder: &mut QueryBuilder<'a, Sqlite>,
    user_id: Uuid,
    emotion: Emotion,
    filter: &UpvoteFilter<'a>,
) {
    builder.push(
        r#"
        FROM (
            SELECT v.*, ROW_NUMBER() OVER (
                PARTITION BY v.song_id ORDER BY v.created_at DESC, v.id DESC
            ) AS rn
            FROM user_song_votes v
            WHERE v.vote = 1 AND v.user_id = "#,
    );
    builder.push_bind(user_id.to_string());
    builder.push(" AND v.emotion = ").push_bind(emotion.code());
    if let Some(context) = filter.context {
        builder.push(" AND v.context = ").push_bind(context.code());
    }
    builder.push(") cv JOIN songs s ON s.id = cv.song_id WHERE cv.rn = 1");
    if let Some(genre) = filter.genre {
        builder.push(" AND s.genre = ").push_bind(genre);
    }
    if let Some(artist) = filter.artist {
        builder.push(" AND s.artist LIKE ")
            .push_bind(format!("%{}%", artist));
    }
}

/// Count and mean center of the current up-vote set
pub async fn upvote_summary<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    filter: &UpvoteFilter<'_>,
) -> Result<UpvoteSummary>
where
    E: SqliteExecutor<'e>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*) AS total, AVG(s.energy) AS energy, AVG(s.valence) AS valence, \
         AVG(s.danceability) AS danceability ",
    );
    push_current_upvotes(&mut builder, user_id, emotion, filter);

    let row = builder.build().fetch_one(executor).await?;
    let total: i64 = row.get("total");
    let center = if total > 0 {
        Some(Attributes::new(
            row.get("energy"),
            row.get("valence"),
            row.get("danceability"),
        ))
    } else {
        None
    };

    Ok(UpvoteSummary { total, center })
}

/// One page of the current up-vote set, most recent first
pub async fn upvoted_songs_page<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    filter: &UpvoteFilter<'_>,
    limit: i64,
    offset: i64,
) -> Result<Vec<UpvotedSong>>
where
    E: SqliteExecutor<'e>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT s.code, s.name, s.artist, s.genre, s.valence, s.energy, s.danceability, \
         cv.context, cv.description, cv.created_at ",
    );
    push_current_upvotes(&mut builder, user_id, emotion, filter);
    builder.push(" ORDER BY cv.created_at DESC, cv.id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let rows = builder.build().fetch_all(executor).await?;
    rows.iter()
        .map(|row| {
            let context: String = row.get("context");
            Ok(UpvotedSong {
                song: song_from_row(row),
                context: context.parse()?,
                description: row.get("description"),
                created_at: time::from_millis(row.get("created_at")),
            })
        })
        .collect()
}

/// Codes of the current up-vote set, most recent first (export snapshot)
pub async fn upvoted_song_codes<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    filter: &UpvoteFilter<'_>,
) -> Result<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT s.code ");
    push_current_upvotes(&mut builder, user_id, emotion, filter);
    builder.push(" ORDER BY cv.created_at DESC, cv.id DESC");

    let rows = builder.build().fetch_all(executor).await?;
    Ok(rows.iter().map(|r| r.get("code")).collect())
}

/// Codes of every song the user has a vote row for under `emotion`
pub async fn voted_song_codes<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
) -> Result<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    let codes = sqlx::query_scalar(
        r#"
        SELECT DISTINCT s.code
        FROM user_song_votes v
        JOIN songs s ON s.id = v.song_id
        WHERE v.user_id = ? AND v.emotion = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(emotion.code())
    .fetch_all(executor)
    .await?;

    Ok(codes)
}

/// Contexts in which the user holds an up-vote for the song and emotion
pub async fn upvote_contexts<'e, E>(
    executor: E,
    user_id: Uuid,
    song_id: i64,
    emotion: Emotion,
) -> Result<Vec<VoteContext>>
where
    E: SqliteExecutor<'e>,
{
    let contexts: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT context FROM user_song_votes
        WHERE user_id = ? AND song_id = ? AND emotion = ? AND vote = 1
        ORDER BY context
        "#,
    )
    .bind(user_id.to_string())
    .bind(song_id)
    .bind(emotion.code())
    .fetch_all(executor)
    .await?;

    contexts.iter().map(|c| c.parse()).collect()
}

fn attributes_from_row(row: &SqliteRow) -> Attributes {
    Attributes::new(
        row.get("energy"),
        row.get("valence"),
        row.get("danceability"),
    )
}

fn vote_from_row(row: &SqliteRow) -> Result<Vote> {
    let user_id: String = row.get("user_id");
    let emotion: String = row.get("emotion");
    let context: String = row.get("context");
    Ok(Vote {
        id: row.get("id"),
        user_id: parse_uuid(&user_id)?,
        song_code: row.get("song_code"),
        emotion: emotion.parse()?,
        context: context.parse()?,
        description: row.get("description"),
        vote: row.get("vote"),
        created_at: time::from_millis(row.get("created_at")),
    })
}
