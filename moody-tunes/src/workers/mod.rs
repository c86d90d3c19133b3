//! Background execution
//!
//! Tasks flow through a durable queue in the database and are executed by
//! a small pool of workers. Handlers are idempotent because delivery is
//! at-least-once.

pub mod pool;
pub mod queue;
pub mod retry_policy;
pub mod schedule;
pub mod task;

use crate::config::RuntimeSettings;
use crate::services::provider::MusicProvider;
use crate::services::provider_auth::ProviderAuthStore;
use crate::services::{cover_image, export, fetch_song, top_artists, user_emotion};
use moody_common::Result;
use queue::{FailureOutcome, TaskQueue};
use sqlx::SqlitePool;
use std::sync::Arc;
use task::Task;
use tracing::{debug, info};

pub use pool::WorkerPool;
pub use queue::ClaimedTask;
pub use schedule::ScheduleRunner;

/// Everything a task handler may touch
#[derive(Clone)]
pub struct WorkerContext {
    pub db: SqlitePool,
    pub settings: Arc<RuntimeSettings>,
    pub provider: Arc<dyn MusicProvider>,
    pub auth_store: ProviderAuthStore,
    pub queue: TaskQueue,
    pub max_top_artists: usize,
}

/// Run one task's handler
pub async fn execute_task(ctx: &WorkerContext, task: &Task) -> Result<()> {
    match task {
        Task::ExportPlaylist(job) => {
            export::run_export(ctx.provider.as_ref(), &ctx.auth_store, job).await?;
        }
        Task::FetchSong { code, username } => {
            let outcome = fetch_song::fetch_song(&ctx.db, ctx.provider.as_ref(), code, username).await?;
            debug!(code = %code, outcome = ?outcome, "Fetch song finished");
        }
        Task::RefreshTopArtists { auth_id } => {
            top_artists::refresh_top_artists(
                &ctx.db,
                ctx.provider.as_ref(),
                &ctx.auth_store,
                *auth_id,
                ctx.max_top_artists,
            )
            .await?;
        }
        Task::RefreshAllTopArtists => {
            top_artists::fan_out(&ctx.db, &ctx.queue).await?;
        }
        Task::RecomputeUserEmotion { user_id, emotion } => {
            user_emotion::recompute(&ctx.db, *user_id, *emotion, ctx.settings.candidate_batch_size)
                .await?;
        }
    }
    Ok(())
}

/// Claim and run a single due task; false when the queue had nothing due
pub async fn process_next(ctx: &WorkerContext) -> Result<bool> {
    let Some(claimed) = ctx.queue.claim_next().await? else {
        return Ok(false);
    };

    debug!(
        task_id = %claimed.id,
        kind = claimed.task.kind(),
        attempt = claimed.attempts,
        "Task started"
    );

    match execute_task(ctx, &claimed.task).await {
        Ok(()) => {
            ctx.queue.complete(&claimed).await?;
            info!(
                task_id = %claimed.id,
                kind = claimed.task.kind(),
                attempt = claimed.attempts,
                "Task completed"
            );
        }
        Err(e) => {
            if ctx.queue.record_failure(&claimed, &e).await? == FailureOutcome::Failed {
                abandon(&claimed.task).await;
            }
        }
    }
    Ok(true)
}

/// Drain every task that is due right now; returns how many ran
pub async fn run_pending(ctx: &WorkerContext) -> Result<usize> {
    let mut processed = 0;
    while process_next(ctx).await? {
        processed += 1;
    }
    Ok(processed)
}

/// Release resources owned by a task that will not run again
async fn abandon(task: &Task) {
    if let Task::ExportPlaylist(job) = task {
        if let Some(path) = &job.cover_image_path {
            cover_image::remove_cover(path).await;
        }
    }
}
