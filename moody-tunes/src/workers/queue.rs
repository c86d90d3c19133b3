//! Durable task queue
//!
//! At-least-once delivery over the `tasks` table. Handlers must be
//! idempotent: a task interrupted by a crash runs again after restart.

use crate::config::RuntimeSettings;
use crate::db::tasks::{self, TaskRecord};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::workers::task::Task;
use moody_common::{time, Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A task claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: Uuid,
    pub task: Task,
    /// Runs started so far, this one included
    pub attempts: u32,
    pub max_attempts: u32,
}

/// What happened to a failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { delay_secs: u64 },
    Failed,
}

#[derive(Clone)]
pub struct TaskQueue {
    db: SqlitePool,
    settings: Arc<RuntimeSettings>,
}

impl TaskQueue {
    pub fn new(db: SqlitePool, settings: Arc<RuntimeSettings>) -> Self {
        Self { db, settings }
    }

    pub async fn enqueue(&self, task: &Task) -> Result<Uuid> {
        self.enqueue_after(task, Duration::ZERO).await
    }

    /// Enqueue a task that becomes claimable after `delay`
    pub async fn enqueue_after(&self, task: &Task, delay: Duration) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_string(task)
            .map_err(|e| Error::Internal(format!("Serialize task failed: {}", e)))?;
        let max_attempts = task.retry_policy(&self.settings).max_attempts();
        let run_after = time::now_millis() + delay.as_millis() as i64;

        retry_on_lock("task enqueue", DEFAULT_MAX_LOCK_WAIT_MS, || {
            tasks::insert_task(&self.db, id, task.kind(), &payload, max_attempts, run_after)
        })
        .await?;

        info!(
            task_id = %id,
            kind = task.kind(),
            delay_secs = delay.as_secs(),
            "Task enqueued"
        );
        Ok(id)
    }

    /// Claim the next due task; undecodable rows are failed and skipped
    pub async fn claim_next(&self) -> Result<Option<ClaimedTask>> {
        loop {
            let record = retry_on_lock("task claim", DEFAULT_MAX_LOCK_WAIT_MS, || {
                tasks::claim_next_due(&self.db, time::now_millis())
            })
            .await?;

            let Some(record) = record else {
                return Ok(None);
            };

            match decode(&record) {
                Ok(task) => {
                    return Ok(Some(ClaimedTask {
                        id: record.id,
                        task,
                        attempts: record.attempts,
                        max_attempts: record.max_attempts,
                    }))
                }
                Err(e) => {
                    error!(task_id = %record.id, kind = %record.kind, error = %e, "Corrupt task payload");
                    tasks::mark_failed(&self.db, record.id, &e.to_string()).await?;
                }
            }
        }
    }

    pub async fn complete(&self, claimed: &ClaimedTask) -> Result<()> {
        retry_on_lock("task complete", DEFAULT_MAX_LOCK_WAIT_MS, || {
            tasks::mark_completed(&self.db, claimed.id)
        })
        .await
    }

    /// Re-queue with backoff when the error is retryable and attempts remain
    pub async fn record_failure(&self, claimed: &ClaimedTask, err: &Error) -> Result<FailureOutcome> {
        let policy = claimed.task.retry_policy(&self.settings);
        let message = err.to_string();

        if err.is_retryable() && claimed.attempts < claimed.max_attempts {
            let delay = policy.delay_for(err, claimed.attempts.saturating_sub(1));
            let run_after = time::now_millis() + delay.as_millis() as i64;
            retry_on_lock("task retry", DEFAULT_MAX_LOCK_WAIT_MS, || {
                tasks::mark_retry(&self.db, claimed.id, run_after, &message)
            })
            .await?;

            warn!(
                task_id = %claimed.id,
                kind = claimed.task.kind(),
                attempt = claimed.attempts,
                max_attempts = claimed.max_attempts,
                delay_secs = delay.as_secs(),
                error = %message,
                "Task failed, retry scheduled"
            );
            return Ok(FailureOutcome::Retrying {
                delay_secs: delay.as_secs(),
            });
        }

        retry_on_lock("task fail", DEFAULT_MAX_LOCK_WAIT_MS, || {
            tasks::mark_failed(&self.db, claimed.id, &message)
        })
        .await?;

        error!(
            task_id = %claimed.id,
            kind = claimed.task.kind(),
            attempt = claimed.attempts,
            retryable = err.is_retryable(),
            error = %message,
            "Task failed permanently"
        );
        Ok(FailureOutcome::Failed)
    }

    /// Return tasks left running by a previous process to the queue
    pub async fn reset_interrupted(&self) -> Result<u64> {
        let count = tasks::reset_running(&self.db).await?;
        if count > 0 {
            info!(count, "Re-queued tasks interrupted by previous shutdown");
        }
        Ok(count)
    }
}

fn decode(record: &TaskRecord) -> Result<Task> {
    serde_json::from_str(&record.payload)
        .map_err(|e| Error::Internal(format!("Undecodable {} payload: {}", record.kind, e)))
}
