//! Provider credential database operations
//!
//! Tokens are encrypted with the process-wide `TokenCipher` on the way in
//! and decrypted on the way out; nothing above this module sees ciphertext.

use super::users::parse_uuid;
use chrono::{DateTime, Utc};
use moody_common::crypto::TokenCipher;
use moody_common::db::{ProviderAuth, ProviderUserData};
use moody_common::{time, Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Fields needed to link a provider account
#[derive(Clone)]
pub struct NewProviderAuth {
    pub user_id: Uuid,
    pub provider_user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub scopes: Vec<String>,
}

const AUTH_COLUMNS: &str =
    "id, user_id, provider_user_id, access_token, refresh_token, last_refreshed, scopes";

pub async fn insert_auth(
    pool: &SqlitePool,
    cipher: &TokenCipher,
    auth: &NewProviderAuth,
) -> Result<ProviderAuth> {
    let now = Utc::now();
    let scopes = serde_json::to_string(&auth.scopes)
        .map_err(|e| Error::Internal(format!("Serialize scopes failed: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO provider_auths
            (user_id, provider_user_id, access_token, refresh_token, last_refreshed, scopes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id.to_string())
    .bind(&auth.provider_user_id)
    .bind(cipher.encrypt(&auth.access_token)?)
    .bind(cipher.encrypt(&auth.refresh_token)?)
    .bind(now.timestamp_millis())
    .bind(scopes)
    .bind(now.timestamp_millis())
    .execute(pool)
    .await?;

    Ok(ProviderAuth {
        id: result.last_insert_rowid(),
        user_id: auth.user_id,
        provider_user_id: auth.provider_user_id.clone(),
        access_token: auth.access_token.clone(),
        refresh_token: auth.refresh_token.clone(),
        last_refreshed: time::from_millis(now.timestamp_millis()),
        scopes: auth.scopes.clone(),
    })
}

pub async fn load_by_id(
    pool: &SqlitePool,
    cipher: &TokenCipher,
    auth_id: i64,
) -> Result<Option<ProviderAuth>> {
    let row = sqlx::query(&format!("SELECT {} FROM provider_auths WHERE id = ?", AUTH_COLUMNS))
        .bind(auth_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| auth_from_row(&r, cipher)).transpose()
}

pub async fn load_by_user(
    pool: &SqlitePool,
    cipher: &TokenCipher,
    user_id: Uuid,
) -> Result<Option<ProviderAuth>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM provider_auths WHERE user_id = ?",
        AUTH_COLUMNS
    ))
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| auth_from_row(&r, cipher)).transpose()
}

pub async fn exists_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM provider_auths WHERE user_id = ?)")
            .bind(user_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Store a refreshed access token; `last_refreshed` never moves backwards
pub async fn update_access_token(
    pool: &SqlitePool,
    cipher: &TokenCipher,
    auth_id: i64,
    access_token: &str,
    refreshed_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE provider_auths
        SET access_token = ?, last_refreshed = MAX(last_refreshed, ?)
        WHERE id = ?
        "#,
    )
    .bind(cipher.encrypt(access_token)?)
    .bind(refreshed_at.timestamp_millis())
    .bind(auth_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Provider auth {}", auth_id)));
    }
    Ok(())
}

/// Remove the user's provider link; dependent data cascades
pub async fn delete_by_user(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM provider_auths WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Ids of every auth holding `scope`
pub async fn ids_with_scope(pool: &SqlitePool, scope: &str) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT id FROM provider_auths
        WHERE EXISTS (SELECT 1 FROM json_each(provider_auths.scopes) WHERE json_each.value = ?)
        ORDER BY id
        "#,
    )
    .bind(scope)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn save_top_artists(pool: &SqlitePool, auth_id: i64, artists: &[String]) -> Result<()> {
    let encoded = serde_json::to_string(artists)
        .map_err(|e| Error::Internal(format!("Serialize top artists failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO provider_user_data (auth_id, top_artists, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(auth_id) DO UPDATE SET
            top_artists = excluded.top_artists,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(auth_id)
    .bind(encoded)
    .bind(time::now_millis())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_user_data(pool: &SqlitePool, auth_id: i64) -> Result<ProviderUserData> {
    let encoded: Option<String> =
        sqlx::query_scalar("SELECT top_artists FROM provider_user_data WHERE auth_id = ?")
            .bind(auth_id)
            .fetch_optional(pool)
            .await?;

    Ok(ProviderUserData {
        top_artists: decode_artists(encoded)?,
    })
}

/// Top artists for a user, empty when the user has no provider link
pub async fn top_artists_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<String>> {
    let encoded: Option<String> = sqlx::query_scalar(
        r#"
        SELECT d.top_artists
        FROM provider_user_data d
        JOIN provider_auths a ON a.id = d.auth_id
        WHERE a.user_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    decode_artists(encoded)
}

fn decode_artists(encoded: Option<String>) -> Result<Vec<String>> {
    match encoded {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| Error::Internal(format!("Corrupt top artists: {}", e))),
        None => Ok(Vec::new()),
    }
}

fn auth_from_row(row: &SqliteRow, cipher: &TokenCipher) -> Result<ProviderAuth> {
    let user_id: String = row.get("user_id");
    let access_token: String = row.get("access_token");
    let refresh_token: String = row.get("refresh_token");
    let scopes: String = row.get("scopes");

    Ok(ProviderAuth {
        id: row.get("id"),
        user_id: parse_uuid(&user_id)?,
        provider_user_id: row.get("provider_user_id"),
        access_token: cipher.decrypt(&access_token)?,
        refresh_token: cipher.decrypt(&refresh_token)?,
        last_refreshed: time::from_millis(row.get("last_refreshed")),
        scopes: serde_json::from_str(&scopes)
            .map_err(|e| Error::Internal(format!("Corrupt scopes: {}", e)))?,
    })
}
