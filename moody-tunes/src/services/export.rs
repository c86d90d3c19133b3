//! Playlist export
//!
//! The request path snapshots the current up-vote codes and queues an
//! export task. The task converges the remote playlist to exactly that
//! snapshot: find-or-create by exact name, clear, then add in order, so a
//! retried run ends in the same state as a clean one.

use crate::db::votes::{self, UpvoteFilter};
use crate::services::cover_image;
use crate::services::provider::MusicProvider;
use crate::services::provider_auth::{require_scope, ProviderAuthStore};
use crate::workers::queue::TaskQueue;
use crate::workers::task::{ExportJob, Task};
use moody_common::db::{SCOPE_IMAGE_UPLOAD, SCOPE_PLAYLIST_MODIFY};
use moody_common::{Emotion, Error, Result, VoteContext};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_PLAYLIST_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub emotion: Emotion,
    pub playlist_name: String,
    pub genre: Option<String>,
    pub context: Option<VoteContext>,
    /// Base64 image, optionally as a `data:` URL
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportAccepted {
    pub task_id: Uuid,
    pub song_count: usize,
    pub message: String,
}

/// What one successful export run did remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub playlist_id: String,
    pub created: bool,
    pub cover_uploaded: bool,
    pub removed: usize,
    pub added: usize,
}

#[derive(Clone)]
pub struct ExportService {
    db: SqlitePool,
    queue: TaskQueue,
    auth_store: ProviderAuthStore,
    image_dir: PathBuf,
}

impl ExportService {
    pub fn new(
        db: SqlitePool,
        queue: TaskQueue,
        auth_store: ProviderAuthStore,
        image_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            queue,
            auth_store,
            image_dir,
        }
    }

    pub async fn request_export(&self, user_id: Uuid, request: &ExportRequest) -> Result<ExportAccepted> {
        let playlist_name = validate_playlist_name(&request.playlist_name)?;

        let auth = self
            .auth_store
            .peek_user(user_id)
            .await?
            .ok_or_else(|| Error::Permission("Connect your Spotify account first".to_string()))?;
        require_scope(&auth, SCOPE_PLAYLIST_MODIFY)?;

        let filter = UpvoteFilter {
            genre: request.genre.as_deref().filter(|g| !g.trim().is_empty()),
            context: request.context.filter(|c| *c != VoteContext::Unspecified),
            artist: None,
        };
        let song_codes = votes::upvoted_song_codes(&self.db, user_id, request.emotion, &filter).await?;
        if song_codes.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Your {} playlist is empty!",
                request.emotion.full_name()
            )));
        }

        let cover_image_path = match request.cover_image.as_deref().filter(|c| !c.is_empty()) {
            Some(encoded) => Some(
                cover_image::save_cover(&self.image_dir, user_id, request.emotion, playlist_name, encoded)
                    .await?,
            ),
            None => None,
        };

        let song_count = song_codes.len();
        let job = ExportJob {
            auth_id: auth.id,
            playlist_name: playlist_name.to_string(),
            song_codes,
            cover_image_path: cover_image_path.clone(),
        };
        let task_id = match self.queue.enqueue(&Task::ExportPlaylist(job)).await {
            Ok(task_id) => task_id,
            Err(e) => {
                if let Some(path) = &cover_image_path {
                    cover_image::remove_cover(path).await;
                }
                return Err(e);
            }
        };

        info!(
            user_id = %user_id,
            task_id = %task_id,
            emotion = %request.emotion,
            song_count,
            "Playlist export queued"
        );
        Ok(ExportAccepted {
            task_id,
            song_count,
            message: format!(
                "Your {} playlist is being exported to Spotify as '{}'",
                request.emotion.full_name(),
                playlist_name
            ),
        })
    }
}

fn validate_playlist_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Playlist name is required".to_string()));
    }
    if name.chars().count() > MAX_PLAYLIST_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Playlist name is limited to {} characters",
            MAX_PLAYLIST_NAME_LEN
        )));
    }
    Ok(name)
}

/// Materialize the job's snapshot as the remote playlist
pub async fn run_export(
    provider: &dyn MusicProvider,
    auth_store: &ProviderAuthStore,
    job: &ExportJob,
) -> Result<ExportReport> {
    let auth = auth_store.get_and_refresh(job.auth_id).await?;
    require_scope(&auth, SCOPE_PLAYLIST_MODIFY)?;
    let token = auth.access_token.as_str();

    let existing = provider
        .user_playlists(token, &auth.provider_user_id)
        .await?
        .into_iter()
        .find(|p| p.name == job.playlist_name);
    let (playlist_id, created) = match existing {
        Some(playlist) => (playlist.id, false),
        None => {
            let id = provider
                .create_playlist(token, &auth.provider_user_id, &job.playlist_name)
                .await?;
            info!(auth_id = auth.id, playlist_id = %id, "Remote playlist created");
            (id, true)
        }
    };

    let mut cover_uploaded = false;
    if let Some(path) = &job.cover_image_path {
        if auth.has_scope(SCOPE_IMAGE_UPLOAD) {
            let upload = match cover_image::load_cover(path).await {
                Ok(jpeg) => provider.upload_playlist_cover(token, &playlist_id, &jpeg).await,
                Err(e) => Err(e),
            };
            match upload {
                Ok(()) => cover_uploaded = true,
                Err(e) => warn!(
                    auth_id = auth.id,
                    playlist_id = %playlist_id,
                    error = %e,
                    "Cover upload failed, continuing export"
                ),
            }
        } else {
            info!(auth_id = auth.id, "Image upload scope not granted, skipping cover");
        }
    }

    let current = provider.playlist_track_uris(token, &playlist_id).await?;
    if !current.is_empty() {
        provider.remove_tracks(token, &playlist_id, &current).await?;
    }
    provider.add_tracks(token, &playlist_id, &job.song_codes).await?;

    if let Some(path) = &job.cover_image_path {
        cover_image::remove_cover(path).await;
    }

    info!(
        auth_id = auth.id,
        playlist_id = %playlist_id,
        created,
        removed = current.len(),
        added = job.song_codes.len(),
        "Playlist export finished"
    );
    Ok(ExportReport {
        playlist_id,
        created,
        cover_uploaded,
        removed: current.len(),
        added: job.song_codes.len(),
    })
}
