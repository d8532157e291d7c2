//! Outer loop: interleaves mention-processing iterations with cleanup
//! sweeps and honors shutdown between every step.

use crate::cleanup::CleanupManager;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::pipeline::MessageProcessor;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;

/// Drives the bot: `iterations_per_sweep` processor runs, then one cleanup
/// sweep, forever. Every `wide_sweep_every`-th sweep uses the wide cutoff
/// so old rows are eventually reconciled without paying the full scan cost
/// each time.
pub struct Scheduler {
    processor: MessageProcessor,
    cleanup: CleanupManager,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(processor: MessageProcessor, cleanup: CleanupManager, config: SchedulerConfig) -> Self {
        Self {
            processor,
            cleanup,
            config,
        }
    }

    /// Run until `shutdown` flips to true. Per-mention failures are
    /// contained inside the processor; an error surfacing here means the
    /// iteration itself could not run, which is fatal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        let mut sweep_count: u32 = 0;

        loop {
            for _ in 0..self.config.iterations_per_sweep {
                if *shutdown.borrow() {
                    tracing::info!("shutdown requested, stopping");
                    return Ok(());
                }

                let summary = self.processor.run_once().await?;
                tracing::debug!(
                    completed = summary.completed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "processor iteration done"
                );

                if sleep_or_shutdown(poll_interval, &mut shutdown).await {
                    tracing::info!("shutdown requested, stopping");
                    return Ok(());
                }
            }

            sweep_count += 1;
            let hours = if sweep_count % self.config.wide_sweep_every == 0 {
                self.config.wide_cutoff_hours
            } else {
                self.config.recent_cutoff_hours
            };
            let cutoff = Utc::now() - chrono::Duration::hours(hours);
            self.cleanup.reconcile(cutoff).await?;
        }
    }
}

/// Sleep for `duration`, waking early if shutdown is signalled. Returns
/// true when shutdown was requested.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        result = shutdown.changed() => match result {
            Ok(()) => *shutdown.borrow(),
            // All senders dropped; treat as shutdown.
            Err(_) => true,
        },
    }
}
