//! Runtime settings for moody-tunes
//!
//! Bootstrap values come from TOML/ENV (see `moody_common::config`). Tunables
//! that operators may adjust live in the `settings` table and are read once
//! at startup. Missing or unparsable values fall back to built-in defaults.

use crate::db::settings::get_setting;
use moody_common::Result;
use sqlx::SqlitePool;
use tracing::warn;

/// Hard cap on ids/URIs per provider batch call
pub const PROVIDER_MAX_BATCH: usize = 100;

/// Runtime tunables loaded from the `settings` table
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// N in the user-emotion recompute (most recent distinct up-votes)
    pub candidate_batch_size: usize,
    pub browse_default_jitter: f64,
    pub browse_default_limit: usize,
    pub browse_max_limit: usize,
    pub browse_cache_ttl_secs: u64,
    pub playlist_page_size: usize,
    pub provider_token_ttl_secs: i64,
    pub provider_batch_size: usize,
    pub export_retry_delay_secs: u64,
    pub export_max_retries: u32,
    pub suggest_rate_limit_per_minute: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            candidate_batch_size: 15,
            browse_default_jitter: 0.15,
            browse_default_limit: 9,
            browse_max_limit: 25,
            browse_cache_ttl_secs: 600,
            playlist_page_size: 15,
            provider_token_ttl_secs: 3600,
            provider_batch_size: PROVIDER_MAX_BATCH,
            export_retry_delay_secs: 900,
            export_max_retries: 3,
            suggest_rate_limit_per_minute: 3,
        }
    }
}

impl RuntimeSettings {
    /// Load settings, falling back to defaults per key
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            candidate_batch_size: load_or(pool, "candidate_batch_size", defaults.candidate_batch_size)
                .await?
                .max(1),
            browse_default_jitter: load_or(pool, "browse_default_jitter", defaults.browse_default_jitter)
                .await?
                .clamp(0.0, 0.5),
            browse_default_limit: load_or(pool, "browse_default_limit", defaults.browse_default_limit)
                .await?,
            browse_max_limit: load_or(pool, "browse_max_limit", defaults.browse_max_limit).await?,
            browse_cache_ttl_secs: load_or(pool, "browse_cache_ttl_secs", defaults.browse_cache_ttl_secs)
                .await?,
            playlist_page_size: load_or(pool, "playlist_page_size", defaults.playlist_page_size)
                .await?
                .max(1),
            provider_token_ttl_secs: load_or(
                pool,
                "provider_token_ttl_secs",
                defaults.provider_token_ttl_secs,
            )
            .await?,
            provider_batch_size: load_or(pool, "provider_batch_size", defaults.provider_batch_size)
                .await?
                .clamp(1, PROVIDER_MAX_BATCH),
            export_retry_delay_secs: load_or(
                pool,
                "export_retry_delay_secs",
                defaults.export_retry_delay_secs,
            )
            .await?,
            export_max_retries: load_or(pool, "export_max_retries", defaults.export_max_retries)
                .await?,
            suggest_rate_limit_per_minute: load_or(
                pool,
                "suggest_rate_limit_per_minute",
                defaults.suggest_rate_limit_per_minute,
            )
            .await?
            .max(1),
        };

        if settings.browse_default_limit > settings.browse_max_limit {
            warn!(
                default_limit = settings.browse_default_limit,
                max_limit = settings.browse_max_limit,
                "browse_default_limit exceeds browse_max_limit, clamping"
            );
            return Ok(Self {
                browse_default_limit: settings.browse_max_limit,
                ..settings
            });
        }

        Ok(settings)
    }
}

async fn load_or<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match get_setting::<T>(pool, key).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(default),
        Err(moody_common::Error::Config(msg)) => {
            warn!(key, error = %msg, default = %default, "Invalid setting value, using default");
            Ok(default)
        }
        Err(e) => Err(e),
    }
}
