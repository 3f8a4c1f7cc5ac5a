use {
    crate::traits::Notifying,
    acceptance::Acceptance,
    anyhow::{Context, Result},
    chrono::Utc,
    model::{RateConfirmation, RateConfirmationStatus, WorkflowId},
    std::{sync::Arc, time::Duration},
    storage::{LoadStoring, NewRateConfirmation, WorkflowStoring},
};

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("rate confirmation not found")]
    NotFound,
    /// The driver decision window has lapsed; accepting is no longer
    /// possible.
    #[error("driver decision window has expired")]
    DeadlineExpired,
    /// The workflow already reached a terminal state. A no-op for the
    /// caller, not a failure of the system.
    #[error("rate confirmation already decided")]
    WorkflowClosed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// State machine for rate-confirmation workflows.
///
/// Every transition out of the driver-decision-pending state is a
/// compare-and-swap in the store, so a driver decision racing the expiry
/// sweep resolves to exactly one terminal state.
pub struct RateConfirmations {
    workflows: Arc<dyn WorkflowStoring>,
    loads: Arc<dyn LoadStoring>,
    notifier: Arc<dyn Notifying>,
    decision_window: Duration,
}

impl RateConfirmations {
    pub fn new(
        workflows: Arc<dyn WorkflowStoring>,
        loads: Arc<dyn LoadStoring>,
        notifier: Arc<dyn Notifying>,
        decision_window: Duration,
    ) -> Self {
        Self {
            workflows,
            loads,
            notifier,
            decision_window,
        }
    }

    /// Creates the workflow for a fresh acceptance and auto-advances it to
    /// dispatch-signed, which starts the driver's decision window.
    pub async fn generate(&self, acceptance: &Acceptance) -> Result<RateConfirmation> {
        let bid = self
            .loads
            .read_bid(acceptance.bid_id)
            .await?
            .context("accepted bid disappeared")?;
        let document_reference = format!(
            "ratecon-{}-{}-{}",
            acceptance.load_id,
            acceptance.bid_id,
            acceptance.accepted_at.timestamp_millis(),
        );
        let workflow = self
            .workflows
            .insert(NewRateConfirmation {
                load_id: acceptance.load_id,
                bid_id: acceptance.bid_id,
                carrier_id: bid.carrier_id,
                document_reference,
            })
            .await?;

        let signed_at = Utc::now();
        let deadline = signed_at + chrono::Duration::from_std(self.decision_window)?;
        let workflow = self
            .workflows
            .mark_dispatch_signed(workflow.id, signed_at, deadline)
            .await?
            .context("freshly created workflow was not in the generated state")?;
        tracing::info!(
            workflow = %workflow.id,
            load = %workflow.load_id,
            %deadline,
            "rate confirmation dispatch signed"
        );

        // Fire and forget: a delivery failure never blocks the transition
        // and does not extend the decision window.
        if let Err(err) = self.notifier.dispatch_signed(&workflow).await {
            tracing::warn!(workflow = %workflow.id, ?err, "dispatch-signed notification failed");
        }
        if let Err(err) = self
            .notifier
            .driver_decision_required(&workflow, deadline)
            .await
        {
            tracing::warn!(workflow = %workflow.id, ?err, "decision-required notification failed");
        }

        Ok(workflow)
    }

    /// The driver commits to the load. Valid only while dispatch-signed and
    /// before the deadline.
    pub async fn driver_accept(
        &self,
        id: WorkflowId,
        driver_id: &str,
    ) -> Result<RateConfirmation, DecisionError> {
        let workflow = self.read_open(id).await?;

        let now = Utc::now();
        if workflow.past_deadline(now) {
            // A late accept both fails and finalizes the workflow so it
            // never lingers past its deadline waiting for the next sweep.
            if let Some(expired) = self
                .workflows
                .finalize(id, RateConfirmationStatus::Expired, now)
                .await
                .map_err(DecisionError::Other)?
            {
                tracing::info!(workflow = %id, driver_id, "late accept, expiring workflow");
                self.return_to_marketplace(&expired).await;
            }
            Metrics::get().decisions.with_label_values(&["late_accept"]).inc();
            return Err(DecisionError::DeadlineExpired);
        }

        match self
            .workflows
            .finalize(id, RateConfirmationStatus::DriverAccepted, now)
            .await
            .map_err(DecisionError::Other)?
        {
            Some(workflow) => {
                Metrics::get().decisions.with_label_values(&["accepted"]).inc();
                tracing::info!(workflow = %id, driver_id, "driver accepted rate confirmation");
                if let Err(err) = self.notifier.accepted(&workflow).await {
                    tracing::warn!(workflow = %id, ?err, "acceptance notification failed");
                }
                Ok(workflow)
            }
            // The expiry sweep (or a concurrent decision) won the race.
            None => Err(DecisionError::WorkflowClosed),
        }
    }

    /// The driver declines the load. Permitted at any time before a
    /// terminal state, including past the deadline: a late rejection still
    /// unblocks the load.
    pub async fn driver_reject(
        &self,
        id: WorkflowId,
        driver_id: &str,
        reason: Option<&str>,
    ) -> Result<(), DecisionError> {
        self.read_open(id).await?;

        match self
            .workflows
            .finalize(id, RateConfirmationStatus::Rejected, Utc::now())
            .await
            .map_err(DecisionError::Other)?
        {
            Some(workflow) => {
                Metrics::get().decisions.with_label_values(&["rejected"]).inc();
                tracing::info!(
                    workflow = %id,
                    driver_id,
                    reason = reason.unwrap_or("<none>"),
                    "driver rejected rate confirmation"
                );
                self.loads
                    .set_load_open(workflow.load_id)
                    .await
                    .context("return load to marketplace")?;
                if let Err(err) = self.notifier.rejected_or_expired(&workflow).await {
                    tracing::warn!(workflow = %id, ?err, "rejection notification failed");
                }
                Ok(())
            }
            None => Err(DecisionError::WorkflowClosed),
        }
    }

    pub async fn get(&self, id: WorkflowId) -> Result<Option<RateConfirmation>> {
        self.workflows.get(id).await
    }

    /// Reads the workflow and rejects calls on missing or already-decided
    /// ones.
    async fn read_open(&self, id: WorkflowId) -> Result<RateConfirmation, DecisionError> {
        let workflow = self
            .workflows
            .get(id)
            .await
            .map_err(DecisionError::Other)?
            .ok_or(DecisionError::NotFound)?;
        if workflow.status.is_terminal() {
            return Err(DecisionError::WorkflowClosed);
        }
        Ok(workflow)
    }

    /// Returns the load to open bidding. Failures are logged, not
    /// propagated: the workflow transition already committed and the next
    /// operator intervention can reopen the load by hand.
    async fn return_to_marketplace(&self, workflow: &RateConfirmation) {
        if let Err(err) = self.loads.set_load_open(workflow.load_id).await {
            tracing::error!(
                workflow = %workflow.id,
                load = %workflow.load_id,
                ?err,
                "failed to return load to marketplace"
            );
        }
        if let Err(err) = self.notifier.rejected_or_expired(workflow).await {
            tracing::warn!(workflow = %workflow.id, ?err, "expiry notification failed");
        }
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "rate_confirmation")]
struct Metrics {
    /// Outcomes of driver decisions.
    #[metric(labels("result"))]
    decisions: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
