//! Background overdue sweep.
//!
//! Runs [`LendingDesk::sweep_overdue`] on a fixed interval until told to
//! stop. Each sweep is a single store action, so it is serialized against
//! concurrent returns and never observes a half-applied command.

use crate::desk::LendingDesk;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a running sweep task
#[derive(Debug)]
pub struct OverdueSweeper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl OverdueSweeper {
    /// Start sweeping every `interval`, the first sweep one interval from now
    #[must_use]
    pub fn spawn(desk: LendingDesk, interval: Duration) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sweeps = 0_u64;

            tracing::info!(interval_secs = interval.as_secs(), "Overdue sweeper started");
            while !*signal.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        match desk.sweep_overdue().await {
                            Ok(report) => {
                                sweeps += 1;
                                tracing::info!(
                                    members_checked = report.members_checked,
                                    members_suspended = report.members_suspended,
                                    days_charged = report.days_charged,
                                    "Overdue sweep finished"
                                );
                            }
                            Err(error) => {
                                tracing::warn!(%error, "Overdue sweep failed");
                            }
                        }
                    }

                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(sweeps, "Overdue sweeper stopped");
            sweeps
        });

        Self { shutdown, task }
    }

    /// Signal the task and wait for it to finish
    ///
    /// Returns how many sweeps completed.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(sweeps) => sweeps,
            Err(error) => {
                tracing::error!(%error, "Overdue sweeper task failed");
                0
            },
        }
    }
}
