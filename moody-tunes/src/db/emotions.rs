//! Emotion registry reads

use moody_common::{Attributes, Emotion, Error, Result};
use sqlx::{Row, SqliteExecutor};

/// Default center for an emotion as stored in the registry
pub async fn load_defaults<'e, E>(executor: E, emotion: Emotion) -> Result<Attributes>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT energy, valence, danceability FROM emotions WHERE name = ?")
        .bind(emotion.code())
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::Internal(format!("Emotion {} missing from registry", emotion)))?;

    Ok(Attributes::new(
        row.get("energy"),
        row.get("valence"),
        row.get("danceability"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use moody_common::db::init_memory_database;

    #[tokio::test]
    async fn test_seeded_defaults_match_registry() {
        let pool = init_memory_database().await.unwrap();
        for emotion in Emotion::ALL {
            let stored = load_defaults(&pool, emotion).await.unwrap();
            assert_eq!(stored, emotion.default_attributes());
        }
    }
}
