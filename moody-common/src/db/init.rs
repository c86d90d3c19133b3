//! Database initialization
//!
//! Creates the schema on first run, seeds the emotion registry and the
//! runtime settings. Every step is idempotent so it runs on each startup.

use crate::emotion::Emotion;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Open (or create) the database file and bring the schema up to date
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer (HTTP + workers)
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    initialize_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the production schema
///
/// Every connection to `sqlite::memory:` is a distinct database, so the
/// pool is capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    initialize_schema(&pool).await?;
    Ok(pool)
}

/// Create tables, seed emotions and default settings
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_emotions_table(pool).await?;
    create_songs_table(pool).await?;
    create_user_emotions_table(pool).await?;
    create_user_song_votes_table(pool).await?;
    create_provider_auths_table(pool).await?;
    create_provider_user_data_table(pool).await?;
    create_oauth_states_table(pool).await?;
    create_tasks_table(pool).await?;

    seed_emotions(pool).await?;
    init_default_settings(pool).await?;

    Ok(())
}

pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_emotions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emotions (
            name TEXT PRIMARY KEY,
            energy REAL NOT NULL CHECK (energy BETWEEN 0 AND 1),
            valence REAL NOT NULL CHECK (valence BETWEEN 0 AND 1),
            danceability REAL NOT NULL CHECK (danceability BETWEEN 0 AND 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE CHECK (length(code) <= 36),
            name TEXT NOT NULL CHECK (length(name) <= 200),
            artist TEXT NOT NULL CHECK (length(artist) <= 200),
            genre TEXT NOT NULL DEFAULT '' CHECK (length(genre) <= 20),
            valence REAL NOT NULL CHECK (valence BETWEEN 0 AND 1),
            energy REAL NOT NULL CHECK (energy BETWEEN 0 AND 1),
            danceability REAL NOT NULL DEFAULT 0 CHECK (danceability BETWEEN 0 AND 1),
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_genre ON songs(genre)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_artist ON songs(artist)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_user_emotions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_emotions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            emotion TEXT NOT NULL REFERENCES emotions(name),
            energy REAL NOT NULL CHECK (energy BETWEEN 0 AND 1),
            valence REAL NOT NULL CHECK (valence BETWEEN 0 AND 1),
            danceability REAL NOT NULL CHECK (danceability BETWEEN 0 AND 1),
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, emotion)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_song_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_song_votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
            emotion TEXT NOT NULL REFERENCES emotions(name),
            context TEXT NOT NULL DEFAULT ''
                CHECK (context IN ('', 'PARTY', 'RELAX', 'WORK', 'EXERCISE', 'OTHER')),
            description TEXT NOT NULL DEFAULT '',
            vote INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (user_id, song_id, emotion, context)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_votes_user_emotion ON user_song_votes(user_id, emotion, vote)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_provider_auths_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_auths (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            provider_user_id TEXT NOT NULL UNIQUE,
            access_token TEXT NOT NULL,
            refresh_token TEXT NOT NULL,
            last_refreshed INTEGER NOT NULL,
            scopes TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_provider_user_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_user_data (
            auth_id INTEGER PRIMARY KEY REFERENCES provider_auths(id) ON DELETE CASCADE,
            top_artists TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_oauth_states_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS oauth_states (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            state TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'running', 'completed', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            run_after INTEGER NOT NULL,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(status, run_after)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Seed the emotion registry with default centers
///
/// Existing rows are left alone so operator adjustments survive restarts.
async fn seed_emotions(pool: &SqlitePool) -> Result<()> {
    for emotion in Emotion::ALL {
        let defaults = emotion.default_attributes();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO emotions (name, energy, valence, danceability) VALUES (?, ?, ?, ?)",
        )
        .bind(emotion.code())
        .bind(defaults.energy)
        .bind(defaults.valence)
        .bind(defaults.danceability)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(emotion = emotion.full_name(), "Seeded emotion defaults");
        }
    }
    Ok(())
}

/// Initialize or repair runtime settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // User-emotion model
    ensure_setting(pool, "candidate_batch_size", "15").await?;

    // Browse
    ensure_setting(pool, "browse_default_jitter", "0.15").await?;
    ensure_setting(pool, "browse_default_limit", "9").await?;
    ensure_setting(pool, "browse_max_limit", "25").await?;
    ensure_setting(pool, "browse_cache_ttl_secs", "600").await?;
    ensure_setting(pool, "playlist_page_size", "15").await?;

    // Provider
    ensure_setting(pool, "provider_token_ttl_secs", "3600").await?;
    ensure_setting(pool, "provider_batch_size", "100").await?;

    // Workers
    ensure_setting(pool, "export_retry_delay_secs", "900").await?;
    ensure_setting(pool, "export_max_retries", "3").await?;
    ensure_setting(pool, "suggest_rate_limit_per_minute", "3").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Missing settings are inserted; NULL values are reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
