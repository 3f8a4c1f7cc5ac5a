use {
    crate::traits::Notifying,
    anyhow::Result,
    chrono::{DateTime, Utc},
    model::{RateConfirmation, RateConfirmationStatus},
    std::{sync::Arc, time::Duration},
    storage::{LoadStoring, WorkflowStoring},
    tokio::{sync::watch, task::JoinHandle},
};

/// Recurring background task enforcing driver-decision deadlines.
///
/// Each tick scans dispatch-signed workflows past their deadline, expires
/// them and returns their loads to open bidding. Every expiry is a
/// compare-and-swap, so ticks are idempotent and safe to run concurrently
/// with driver decisions (or another sweeper instance).
pub struct ExpirySweeper {
    workflows: Arc<dyn WorkflowStoring>,
    loads: Arc<dyn LoadStoring>,
    notifier: Arc<dyn Notifying>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        workflows: Arc<dyn WorkflowStoring>,
        loads: Arc<dyn LoadStoring>,
        notifier: Arc<dyn Notifying>,
        interval: Duration,
    ) -> Self {
        Self {
            workflows,
            loads,
            notifier,
            interval,
        }
    }

    /// Spawns the recurring sweep. The returned handle stops it cleanly,
    /// letting an in-flight tick finish.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut shutdown_receiver) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = self.sweep_once(Utc::now()).await {
                            tracing::warn!(?err, "expiry sweep failed");
                        }
                    }
                    _ = shutdown_receiver.changed() => {
                        tracing::info!("expiry sweeper stopped");
                        break;
                    }
                }
            }
        });
        SweeperHandle { shutdown, task }
    }

    /// Runs a single sweep pass. Public so tests and operational tooling
    /// can drive it with an explicit clock.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<()> {
        let due = self.workflows.due_for_expiry(now).await?;
        if !due.is_empty() {
            tracing::debug!(count = due.len(), "expiring overdue rate confirmations");
        }
        for workflow in due {
            // One workflow's failure must not starve the rest of the batch.
            if let Err(err) = self.expire(&workflow, now).await {
                tracing::error!(
                    workflow = %workflow.id,
                    load = %workflow.load_id,
                    ?err,
                    "failed to expire rate confirmation"
                );
            }
        }
        Ok(())
    }

    async fn expire(&self, workflow: &RateConfirmation, now: DateTime<Utc>) -> Result<()> {
        let Some(expired) = self
            .workflows
            .finalize(workflow.id, RateConfirmationStatus::Expired, now)
            .await?
        else {
            // A driver decision won the race since the batch was read.
            return Ok(());
        };
        self.loads.set_load_open(expired.load_id).await?;
        Metrics::get().expired_total.inc();
        tracing::info!(
            workflow = %expired.id,
            load = %expired.load_id,
            "rate confirmation expired, load returned to marketplace"
        );
        if let Err(err) = self.notifier.rejected_or_expired(&expired).await {
            tracing::warn!(workflow = %expired.id, ?err, "expiry notification failed");
        }
        Ok(())
    }
}

/// Handle for the spawned sweeper; dropping it without calling
/// [`stop`](Self::stop) leaves the task running detached.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "rate_confirmation")]
struct Metrics {
    /// The total number of rate confirmations expired by the sweep.
    #[metric()]
    expired_total: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
