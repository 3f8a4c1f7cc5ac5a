//! Trait definitions for external system boundaries.
//!
//! Notification delivery (SMS/email/push) happens outside this core. The
//! gateway is fire-and-forget: a failed delivery is logged and never rolls
//! back or delays a state transition.

use {
    anyhow::Result,
    chrono::{DateTime, Utc},
    model::RateConfirmation,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifying: Send + Sync {
    /// Dispatch counter-signed the confirmation document.
    async fn dispatch_signed(&self, workflow: &RateConfirmation) -> Result<()>;

    /// Prompts the assigned driver to accept or reject before `deadline`.
    async fn driver_decision_required(
        &self,
        workflow: &RateConfirmation,
        deadline: DateTime<Utc>,
    ) -> Result<()>;

    /// The driver committed to the load.
    async fn accepted(&self, workflow: &RateConfirmation) -> Result<()>;

    /// The workflow closed without a commitment; the load is back on the
    /// marketplace.
    async fn rejected_or_expired(&self, workflow: &RateConfirmation) -> Result<()>;
}

/// Gateway that only logs. Stands in until a real delivery channel is
/// configured and doubles as the default for local runs.
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifying for LoggingNotifier {
    async fn dispatch_signed(&self, workflow: &RateConfirmation) -> Result<()> {
        tracing::info!(workflow = %workflow.id, load = %workflow.load_id, "dispatch signed");
        Ok(())
    }

    async fn driver_decision_required(
        &self,
        workflow: &RateConfirmation,
        deadline: DateTime<Utc>,
    ) -> Result<()> {
        tracing::info!(
            workflow = %workflow.id,
            carrier = %workflow.carrier_id,
            %deadline,
            "driver decision required"
        );
        Ok(())
    }

    async fn accepted(&self, workflow: &RateConfirmation) -> Result<()> {
        tracing::info!(workflow = %workflow.id, load = %workflow.load_id, "driver accepted");
        Ok(())
    }

    async fn rejected_or_expired(&self, workflow: &RateConfirmation) -> Result<()> {
        tracing::info!(
            workflow = %workflow.id,
            load = %workflow.load_id,
            status = ?workflow.status,
            "load returned to marketplace"
        );
        Ok(())
    }
}
