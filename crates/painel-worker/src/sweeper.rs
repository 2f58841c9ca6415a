//! Periodic auto-resolution of stale conversations.
//!
//! One coarse sweep runs at start and then on every tick; there are no
//! per-conversation timers. A failed sweep is logged and retried on the next
//! tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use painel_db::PainelDb;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SweeperConfig;
use crate::error::Result;
use crate::events::WorkerEvent;

#[derive(Clone)]
pub struct AutoResolveSweeper {
    db: Arc<PainelDb>,
    interval: Duration,
    max_age: chrono::Duration,
}

impl AutoResolveSweeper {
    pub fn new(db: Arc<PainelDb>, config: &SweeperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db,
            interval: Duration::from_secs(config.interval_secs),
            max_age: config.max_age()?,
        })
    }

    /// `now - max_age`, clamped to the earliest representable time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Resolve everything not updated since `now - max_age`. Returns the number of rows flipped.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = self.cutoff(now);
        let resolved = self
            .db
            .resolve_stale(cutoff.timestamp(), now.timestamp())
            .await?;

        if resolved > 0 {
            tracing::info!(resolved, cutoff = %cutoff, "Auto-resolved stale conversations");
        } else {
            tracing::debug!(cutoff = %cutoff, "No stale conversations to resolve");
        }
        Ok(resolved)
    }

    pub async fn sweep(&self) -> Result<u64> {
        self.sweep_at(Utc::now()).await
    }

    /// Run the sweep now and then on every interval until the handle is cancelled.
    pub fn start(self, event_tx: Option<mpsc::Sender<WorkerEvent>>) -> SweeperHandle {
        let interval_secs = self.interval.as_secs();
        let task = tokio::spawn(async move {
            // The first tick completes immediately.
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                match self.sweep().await {
                    Ok(resolved) => {
                        if let Some(tx) = &event_tx {
                            let _ = tx.try_send(WorkerEvent::SweepCompleted { resolved });
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Auto-resolve sweep failed, retrying next tick");
                        if let Some(tx) = &event_tx {
                            let _ = tx.try_send(WorkerEvent::Error {
                                channel_id: None,
                                error: format!("Auto-resolve sweep failed: {}", e),
                            });
                        }
                    }
                }
            }
        });

        tracing::info!(interval_secs, "Auto-resolve sweeper started");
        SweeperHandle { task: Some(task) }
    }
}

pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("Auto-resolve sweeper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
