//! Named schedules that enqueue tasks
//!
//! Each entry binds a cadence to a task. The runner only enqueues; the
//! worker pool executes, so a missed tick never runs work twice.

use super::queue::TaskQueue;
use super::task::Task;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Name of the weekly top-artist fan-out schedule
pub const REFRESH_TOP_ARTISTS: &str = "refresh-top-artists";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Interval(Duration),
    /// Once a week at `hour`:00 UTC
    Weekly { weekday: Weekday, hour: u32 },
}

impl Cadence {
    /// First firing strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::Interval(every) => {
                now + ChronoDuration::from_std(every).unwrap_or_else(|_| ChronoDuration::days(1))
            }
            Cadence::Weekly { weekday, hour } => {
                let days_ahead = (weekday.num_days_from_monday() + 7
                    - now.weekday().num_days_from_monday())
                    % 7;
                let date = now.date_naive() + ChronoDuration::days(days_ahead as i64);
                let at = (date.and_time(NaiveTime::MIN) + ChronoDuration::hours((hour % 24) as i64))
                    .and_utc();
                if at > now {
                    at
                } else {
                    at + ChronoDuration::weeks(1)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub name: &'static str,
    pub cadence: Cadence,
    pub task: Task,
}

/// The service's built-in schedules
pub fn default_schedules() -> Vec<ScheduleEntry> {
    vec![ScheduleEntry {
        name: REFRESH_TOP_ARTISTS,
        cadence: Cadence::Weekly {
            weekday: Weekday::Sun,
            hour: 3,
        },
        task: Task::RefreshAllTopArtists,
    }]
}

pub struct ScheduleRunner {
    queue: TaskQueue,
    entries: Vec<ScheduleEntry>,
    shutdown_token: CancellationToken,
}

impl ScheduleRunner {
    pub fn new(queue: TaskQueue, entries: Vec<ScheduleEntry>, shutdown_token: CancellationToken) -> Self {
        Self {
            queue,
            entries,
            shutdown_token,
        }
    }

    pub async fn run(self) {
        if self.entries.is_empty() {
            return;
        }

        let mut next_runs: Vec<DateTime<Utc>> =
            self.entries.iter().map(|e| e.cadence.next_after(Utc::now())).collect();
        for (entry, next) in self.entries.iter().zip(&next_runs) {
            info!(schedule = entry.name, next_run = %next, "Schedule registered");
        }

        loop {
            let now = Utc::now();
            let earliest = next_runs.iter().min().copied().unwrap_or(now);
            let sleep_for = (earliest - now).to_std().unwrap_or(Duration::ZERO);
            debug!(sleep_secs = sleep_for.as_secs(), "Schedule runner sleeping");

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.shutdown_token.cancelled() => {
                    info!("Schedule runner received shutdown signal");
                    break;
                }
            }

            let now = Utc::now();
            for (entry, next) in self.entries.iter().zip(next_runs.iter_mut()) {
                if *next > now {
                    continue;
                }
                match self.queue.enqueue(&entry.task).await {
                    Ok(task_id) => info!(schedule = entry.name, task_id = %task_id, "Scheduled task queued"),
                    Err(e) => error!(schedule = entry.name, error = %e, "Failed to queue scheduled task"),
                }
                *next = entry.cadence.next_after(now);
            }
        }
    }
}
