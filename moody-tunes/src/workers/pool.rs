//! Worker pool
//!
//! A fixed number of tokio tasks poll the queue. Shutdown is checked
//! between tasks only, never in the middle of a handler.

use super::{process_next, WorkerContext};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        ctx: WorkerContext,
        worker_count: usize,
        poll_interval: Duration,
        shutdown_token: CancellationToken,
    ) -> Self {
        let worker_count = worker_count.max(1);
        info!(worker_count, "Starting task workers");

        let handles = (0..worker_count)
            .map(|worker_id| {
                let ctx = ctx.clone();
                let token = shutdown_token.clone();
                tokio::spawn(async move { worker_loop(worker_id, ctx, poll_interval, token).await })
            })
            .collect();

        Self { handles }
    }

    /// Wait for every worker to observe shutdown
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    poll_interval: Duration,
    shutdown_token: CancellationToken,
) {
    loop {
        if shutdown_token.is_cancelled() {
            break;
        }

        let idle = match process_next(&ctx).await {
            Ok(ran) => !ran,
            Err(e) => {
                error!(worker_id, error = %e, "Worker failed to process task");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown_token.cancelled() => break,
            }
        }
    }
    info!(worker_id, "Worker stopped");
}
