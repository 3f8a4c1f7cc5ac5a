//! Trait definitions for the storage boundary.
//!
//! These traits abstract the durable marketplace store and the ephemeral
//! lock store to enable unit testing with mocks and in-memory fakes.

use {
    anyhow::Result,
    chrono::{DateTime, Utc},
    model::{Bid, BidId, Load, LoadId, RateConfirmation, RateConfirmationStatus, WorkflowId},
    std::time::Duration,
};

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    /// The uniqueness invariant rejected the write: the load already has a
    /// winning bid. Terminal for the attempt, whatever the advisory lock
    /// said.
    #[error("load already has a winning bid")]
    AlreadyAssigned,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Abstracts the durable marketplace store holding loads and bids.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LoadStoring: Send + Sync {
    /// Executes the all-or-nothing accept transaction: marks `bid` accepted,
    /// rejects its pending sibling bids and assigns it as the load's winning
    /// bid, guarded by the store's uniqueness invariant. No partial writes
    /// survive a rejected transaction.
    async fn assign_winning_bid(&self, load: LoadId, bid: BidId) -> Result<(), AssignmentError>;

    async fn read_load(&self, load: LoadId) -> Result<Option<Load>>;

    async fn read_bid(&self, bid: BidId) -> Result<Option<Bid>>;

    /// Returns the load to the marketplace: status back to open, winning bid
    /// cleared, the previously accepted bid marked expired.
    async fn set_load_open(&self, load: LoadId) -> Result<()>;
}

/// Abstracts the store holding ephemeral, TTL-bounded acceptance locks.
///
/// Implementations must make [`try_acquire`](Self::try_acquire) an atomic
/// test-and-set and [`release`](Self::release) idempotent. Rows never
/// outlive their TTL as far as acquisition is concerned: an expired lock is
/// free to take over.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LockStoring: Send + Sync {
    async fn try_acquire(&self, key: LoadId, ttl: Duration) -> Result<bool>;

    async fn release(&self, key: LoadId) -> Result<()>;

    async fn is_held(&self, key: LoadId) -> Result<bool>;

    async fn remaining_ttl(&self, key: LoadId) -> Result<Option<Duration>>;
}

/// Insertion payload for a freshly generated rate confirmation. The store
/// assigns the id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewRateConfirmation {
    pub load_id: LoadId,
    pub bid_id: BidId,
    pub carrier_id: String,
    pub document_reference: String,
}

/// Abstracts the store holding rate-confirmation workflows.
///
/// All transitions out of the driver-decision-pending state funnel through
/// [`finalize`](Self::finalize), an atomic compare-and-swap. Exactly one
/// terminal transition wins a race; losers observe `None`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WorkflowStoring: Send + Sync {
    /// Inserts a new workflow in the generated state.
    async fn insert(&self, new: NewRateConfirmation) -> Result<RateConfirmation>;

    async fn get(&self, id: WorkflowId) -> Result<Option<RateConfirmation>>;

    /// Advances a generated workflow to dispatch-signed, recording the
    /// signature time and the driver's acceptance deadline. Returns `None`
    /// if the workflow is not in the generated state.
    async fn mark_dispatch_signed(
        &self,
        id: WorkflowId,
        signed_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Option<RateConfirmation>>;

    /// Compare-and-swaps a dispatch-signed workflow into the terminal status
    /// `to`, recording the driver acceptance time where applicable. Returns
    /// the updated workflow, or `None` if it was no longer dispatch-signed.
    async fn finalize(
        &self,
        id: WorkflowId,
        to: RateConfirmationStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<RateConfirmation>>;

    /// All dispatch-signed workflows whose driver deadline has passed.
    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<RateConfirmation>>;
}
