//! Song catalog database operations

use moody_common::db::Song;
use moody_common::{Axis, Emotion, Result, VoteContext};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteExecutor};
use uuid::Uuid;

/// Float slack on the jitter window so a zero-width window still matches
/// a song sitting exactly on the center
const WINDOW_EPSILON: f64 = 1e-9;

const SONG_COLUMNS: &str = "s.code, s.name, s.artist, s.genre, s.valence, s.energy, s.danceability";

/// Insert a new song; a duplicate code surfaces as a unique violation
pub async fn insert_song<'e, E>(executor: E, song: &Song) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO songs (code, name, artist, genre, valence, energy, danceability, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&song.code)
    .bind(&song.name)
    .bind(&song.artist)
    .bind(&song.genre)
    .bind(song.valence)
    .bind(song.energy)
    .bind(song.danceability)
    .bind(moody_common::time::now_millis())
    .execute(executor)
    .await?;

    Ok(())
}

/// Load song by provider code
pub async fn load_song_by_code<'e, E>(executor: E, code: &str) -> Result<Option<Song>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("SELECT {} FROM songs s WHERE s.code = ?", SONG_COLUMNS))
        .bind(code)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|r| song_from_row(&r)))
}

/// Internal id for a song code
pub async fn song_id_by_code<'e, E>(executor: E, code: &str) -> Result<Option<i64>>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query_scalar("SELECT id FROM songs WHERE code = ?")
        .bind(code)
        .fetch_optional(executor)
        .await?;
    Ok(id)
}

pub async fn song_exists<'e, E>(executor: E, code: &str) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM songs WHERE code = ?)")
        .bind(code)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

/// Load songs for a list of codes, preserving the input order
pub async fn load_songs_by_codes<'e, E>(executor: E, codes: &[String]) -> Result<Vec<Song>>
where
    E: SqliteExecutor<'e>,
{
    if codes.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM songs s WHERE s.code IN (", SONG_COLUMNS));
    let mut separated = builder.separated(", ");
    for code in codes {
        separated.push_bind(code);
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(executor).await?;
    let mut songs: Vec<Song> = rows.iter().map(song_from_row).collect();
    songs.sort_by_key(|song| codes.iter().position(|c| c == &song.code));
    Ok(songs)
}

/// Distinct non-empty genres in the catalog, sorted
pub async fn distinct_genres<'e, E>(executor: E) -> Result<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    let genres = sqlx::query_scalar("SELECT DISTINCT genre FROM songs WHERE genre != '' ORDER BY genre")
        .fetch_all(executor)
        .await?;
    Ok(genres)
}

/// Browse candidate query
///
/// Songs whose value on `axis` lies within `jitter` of `center_value`,
/// narrowed by the optional filters, excluding songs the user already
/// voted on for the emotion (and context, when given). Order is random.
#[derive(Debug, Clone)]
pub struct CandidateFilter<'a> {
    pub user_id: Uuid,
    pub emotion: Emotion,
    pub context: Option<VoteContext>,
    pub axis: Axis,
    pub center_value: f64,
    pub jitter: f64,
    pub genre: Option<&'a str>,
    pub artist: Option<&'a str>,
    /// Restrict to these artists (top-artist personalization)
    pub artists_in: Option<&'a [String]>,
    /// Codes already picked by an earlier pass
    pub exclude_codes: &'a [String],
    pub limit: usize,
}

pub async fn find_candidates<'e, E>(executor: E, filter: &CandidateFilter<'_>) -> Result<Vec<Song>>
where
    E: SqliteExecutor<'e>,
{
    let column = filter.axis.column();
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM songs s WHERE ABS(s.{} - ",
        SONG_COLUMNS, column
    ));
    builder.push_bind(filter.center_value);
    builder.push(") <= ");
    builder.push_bind(filter.jitter + WINDOW_EPSILON);

    if let Some(genre) = filter.genre {
        builder.push(" AND s.genre = ").push_bind(genre);
    }
    if let Some(artist) = filter.artist {
        builder.push(" AND s.artist = ").push_bind(artist);
    }
    if let Some(artists) = filter.artists_in {
        if artists.is_empty() {
            return Ok(Vec::new());
        }
        builder.push(" AND s.artist IN (");
        let mut separated = builder.separated(", ");
        for artist in artists {
            separated.push_bind(artist);
        }
        separated.push_unseparated(")");
    }
    if !filter.exclude_codes.is_empty() {
        builder.push(" AND s.code NOT IN (");
        let mut separated = builder.separated(", ");
        for code in filter.exclude_codes {
            separated.push_bind(code);
        }
        separated.push_unseparated(")");
    }

    builder.push(" AND s.id NOT IN (SELECT v.song_id FROM user_song_votes v WHERE v.user_id = ");
    builder.push_bind(filter.user_id.to_string());
    builder.push(" AND v.emotion = ").push_bind(filter.emotion.code());
    if let Some(context) = filter.context {
        builder.push(" AND v.context = ").push_bind(context.code());
    }
    builder.push(") ORDER BY RANDOM() LIMIT ");
    builder.push_bind(filter.limit as i64);

    let rows = builder.build().fetch_all(executor).await?;
    Ok(rows.iter().map(song_from_row).collect())
}

pub(crate) fn song_from_row(row: &SqliteRow) -> Song {
    Song {
        code: row.get("code"),
        name: row.get("name"),
        artist: row.get("artist"),
        genre: row.get("genre"),
        valence: row.get("valence"),
        energy: row.get("energy"),
        danceability: row.get("danceability"),
    }
}
