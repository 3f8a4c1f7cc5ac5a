use {
    acceptance::{AcceptError, Acceptance, AcceptanceArbiter},
    model::{BidId, LoadId},
    rate_confirmation::RateConfirmations,
    std::sync::Arc,
};

/// Front door for shipper-side bid acceptance.
///
/// Couples the arbiter to rate-confirmation generation: every successful
/// accept schedules exactly one workflow, off the request path.
pub struct Marketplace {
    arbiter: AcceptanceArbiter,
    confirmations: Arc<RateConfirmations>,
}

impl Marketplace {
    pub fn new(arbiter: AcceptanceArbiter, confirmations: Arc<RateConfirmations>) -> Self {
        Self {
            arbiter,
            confirmations,
        }
    }

    /// Attempts to accept `bid` for `load` on behalf of `actor_id`.
    ///
    /// The assignment has already committed by the time this returns, so
    /// workflow generation runs in a detached task: a generation failure is
    /// logged but never rolls the accept back or delays the response.
    pub async fn accept_bid(
        &self,
        load: LoadId,
        bid: BidId,
        actor_id: &str,
    ) -> Result<Acceptance, AcceptError> {
        let acceptance = self.arbiter.attempt_accept(load, bid, actor_id).await?;
        let confirmations = self.confirmations.clone();
        let accepted = acceptance.clone();
        tokio::task::spawn(async move {
            if let Err(err) = confirmations.generate(&accepted).await {
                tracing::error!(
                    load = %accepted.load_id,
                    bid = %accepted.bid_id,
                    ?err,
                    "failed to generate rate confirmation"
                );
            }
        });
        Ok(acceptance)
    }
}
