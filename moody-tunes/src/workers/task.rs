//! Background task definitions

use crate::config::RuntimeSettings;
use crate::workers::retry_policy::RetryPolicy;
use moody_common::Emotion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Playlist export snapshot taken when the request was accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub auth_id: i64,
    pub playlist_name: String,
    /// Track URIs in the order they should appear remotely
    pub song_codes: Vec<String>,
    /// JPEG persisted for this job, removed once the tracks are in place
    #[serde(default)]
    pub cover_image_path: Option<PathBuf>,
}

/// Unit of background work; serialized into the `tasks.payload` column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    ExportPlaylist(ExportJob),
    FetchSong { code: String, username: String },
    RefreshTopArtists { auth_id: i64 },
    RefreshAllTopArtists,
    RecomputeUserEmotion { user_id: Uuid, emotion: Emotion },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::ExportPlaylist(_) => "export_playlist",
            Task::FetchSong { .. } => "fetch_song",
            Task::RefreshTopArtists { .. } => "refresh_top_artists",
            Task::RefreshAllTopArtists => "refresh_all_top_artists",
            Task::RecomputeUserEmotion { .. } => "recompute_user_emotion",
        }
    }

    pub fn retry_policy(&self, settings: &RuntimeSettings) -> RetryPolicy {
        match self {
            Task::ExportPlaylist(_) => RetryPolicy::export(settings),
            _ => RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_kind_tag() {
        let task = Task::FetchSong {
            code: "spotify:track:4uLU6hMCjMI75M1A2tKUQC".to_string(),
            username: "alice".to_string(),
        };
        let payload = serde_json::to_value(&task).unwrap();
        assert_eq!(payload["kind"], task.kind());

        let export = Task::ExportPlaylist(ExportJob {
            auth_id: 7,
            playlist_name: "my-happy".to_string(),
            song_codes: vec!["sp:X".to_string()],
            cover_image_path: None,
        });
        let payload = serde_json::to_string(&export).unwrap();
        assert!(payload.contains("\"kind\":\"export_playlist\""));
        assert_eq!(serde_json::from_str::<Task>(&payload).unwrap(), export);

        let fan_out = serde_json::to_string(&Task::RefreshAllTopArtists).unwrap();
        assert_eq!(fan_out, r#"{"kind":"refresh_all_top_artists"}"#);
    }

    #[test]
    fn test_export_uses_export_policy() {
        let settings = RuntimeSettings::default();
        let export = Task::ExportPlaylist(ExportJob {
            auth_id: 1,
            playlist_name: "x".to_string(),
            song_codes: Vec::new(),
            cover_image_path: None,
        });
        assert_eq!(export.retry_policy(&settings).initial_backoff_secs, 900);
        assert_eq!(Task::RefreshAllTopArtists.retry_policy(&settings).initial_backoff_secs, 60);
    }
}
