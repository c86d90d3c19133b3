//! Materialize a suggested song from the provider

use crate::db::songs;
use crate::services::provider::MusicProvider;
use moody_common::db::{Song, MAX_SONG_TEXT_LEN};
use moody_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Inserted(Song),
    /// The provider has no usable audio features for the track
    MissingFeatures,
    /// A concurrent fetch inserted the same code first
    Raced,
}

pub async fn fetch_song(
    db: &SqlitePool,
    provider: &dyn MusicProvider,
    code: &str,
    username: &str,
) -> Result<FetchOutcome> {
    if songs::song_exists(db, code).await? {
        return Ok(FetchOutcome::AlreadyPresent);
    }

    let track = provider.track(code).await?;
    let features = provider
        .audio_features(&[track.code.clone()])
        .await?
        .into_iter()
        .next()
        .flatten();

    // Danceability 0.0 marks the value as unset; centers substitute the emotion default
    let Some((valence, energy, danceability)) = features.and_then(|f| {
        Some((f.valence?, f.energy?, f.danceability.unwrap_or_default()))
    }) else {
        warn!(code = %code, username = %username, "No audio features for suggested track, skipping");
        return Ok(FetchOutcome::MissingFeatures);
    };

    let song = Song {
        code: code.to_string(),
        name: truncate(&track.name, MAX_SONG_TEXT_LEN),
        artist: truncate(&track.artist, MAX_SONG_TEXT_LEN),
        genre: String::new(),
        valence,
        energy,
        danceability,
    };
    song.validate()?;

    match songs::insert_song(db, &song).await {
        Ok(()) => {
            info!(code = %code, username = %username, name = %song.name, "Suggested song added");
            Ok(FetchOutcome::Inserted(song))
        }
        Err(e) if e.is_unique_violation() => {
            info!(code = %code, "Suggested song inserted concurrently");
            Ok(FetchOutcome::Raced)
        }
        Err(e) => Err(e),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 200), "abc");
    }
}
