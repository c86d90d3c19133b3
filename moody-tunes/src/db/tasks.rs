//! Durable task queue storage
//!
//! Rows move `pending` → `running` → `completed` | `failed`, or back to
//! `pending` with a later `run_after` when a retry is scheduled.

use moody_common::{time, Error, Result};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::Internal(format!("Unknown task status: {}", other))),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored task row
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: String,
    pub payload: String,
    pub status: TaskStatus,
    /// Attempts started so far (incremented on claim)
    pub attempts: u32,
    pub max_attempts: u32,
    /// Epoch milliseconds before which the task is not claimed
    pub run_after: i64,
    pub last_error: Option<String>,
}

const TASK_COLUMNS: &str = "id, kind, payload, status, attempts, max_attempts, run_after, last_error";

pub async fn insert_task(
    pool: &SqlitePool,
    id: Uuid,
    kind: &str,
    payload: &str,
    max_attempts: u32,
    run_after: i64,
) -> Result<()> {
    let now = time::now_millis();
    sqlx::query(
        r#"
        INSERT INTO tasks (id, kind, payload, status, attempts, max_attempts, run_after, created_at, updated_at)
        VALUES (?, ?, ?, 'pending', 0, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(kind)
    .bind(payload)
    .bind(max_attempts as i64)
    .bind(run_after)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically claim the oldest due pending task
pub async fn claim_next_due(pool: &SqlitePool, now_millis: i64) -> Result<Option<TaskRecord>> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE tasks
        SET status = 'running', attempts = attempts + 1, updated_at = ?
        WHERE id = (
            SELECT id FROM tasks
            WHERE status = 'pending' AND run_after <= ?
            ORDER BY run_after, created_at
            LIMIT 1
        )
        AND status = 'pending'
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(now_millis)
    .bind(now_millis)
    .fetch_optional(pool)
    .await?;

    row.map(|r| task_from_row(&r)).transpose()
}

pub async fn mark_completed(pool: &SqlitePool, id: Uuid) -> Result<()> {
    set_status(pool, id, TaskStatus::Completed, None, None).await
}

/// Put the task back in the queue until `run_after`
pub async fn mark_retry(pool: &SqlitePool, id: Uuid, run_after: i64, error: &str) -> Result<()> {
    set_status(pool, id, TaskStatus::Pending, Some(run_after), Some(error)).await
}

pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<()> {
    set_status(pool, id, TaskStatus::Failed, None, Some(error)).await
}

async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: TaskStatus,
    run_after: Option<i64>,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET status = ?,
            run_after = COALESCE(?, run_after),
            last_error = COALESCE(?, last_error),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(run_after)
    .bind(error)
    .bind(time::now_millis())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Return tasks interrupted mid-run (process crash) to the queue
pub async fn reset_running(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'pending', updated_at = ? WHERE status = 'running'",
    )
    .bind(time::now_millis())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn load_task(pool: &SqlitePool, id: Uuid) -> Result<Option<TaskRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| task_from_row(&r)).transpose()
}

/// All tasks of a kind, oldest first
pub async fn list_by_kind(pool: &SqlitePool, kind: &str) -> Result<Vec<TaskRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM tasks WHERE kind = ? ORDER BY created_at, id",
        TASK_COLUMNS
    ))
    .bind(kind)
    .fetch_all(pool)
    .await?;

    rows.iter().map(task_from_row).collect()
}

fn task_from_row(row: &SqliteRow) -> Result<TaskRecord> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let attempts: i64 = row.get("attempts");
    let max_attempts: i64 = row.get("max_attempts");

    Ok(TaskRecord {
        id: super::users::parse_uuid(&id)?,
        kind: row.get("kind"),
        payload: row.get("payload"),
        status: TaskStatus::parse(&status)?,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        run_after: row.get("run_after"),
        last_error: row.get("last_error"),
    })
}
