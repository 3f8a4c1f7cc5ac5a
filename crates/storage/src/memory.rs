//! In-memory storage backend.
//!
//! Implements all storage traits over a single mutex-guarded state so the
//! same atomicity guarantees hold as in the Postgres backend: the accept
//! transaction and every workflow compare-and-swap happen under one lock.
//! Lock deadlines use [`tokio::time::Instant`] so TTL behavior is testable
//! with a paused clock.

use {
    crate::traits::{
        AssignmentError, LoadStoring, LockStoring, NewRateConfirmation, WorkflowStoring,
    },
    anyhow::{Context, Result, anyhow},
    chrono::{DateTime, Utc},
    model::{
        Bid, BidId, BidState, Load, LoadId, LoadStatus, RateConfirmation, RateConfirmationStatus,
        WorkflowId,
    },
    std::{
        collections::HashMap,
        sync::Mutex,
        time::Duration,
    },
    tokio::time::Instant,
};

#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    loads: HashMap<LoadId, Load>,
    bids: HashMap<BidId, Bid>,
    workflows: HashMap<WorkflowId, RateConfirmation>,
    next_workflow_id: i64,
    lock_deadlines: HashMap<LoadId, Instant>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_load(&self, load: Load) {
        let mut state = self.state.lock().unwrap();
        state.loads.insert(load.id, load);
    }

    pub fn insert_bid(&self, bid: Bid) {
        let mut state = self.state.lock().unwrap();
        state.bids.insert(bid.id, bid);
    }
}

#[async_trait::async_trait]
impl LoadStoring for InMemoryStorage {
    async fn assign_winning_bid(&self, load: LoadId, bid: BidId) -> Result<(), AssignmentError> {
        let mut state = self.state.lock().unwrap();

        if !state
            .bids
            .get(&bid)
            .is_some_and(|candidate| candidate.load_id == load)
        {
            return Err(anyhow!("bid {bid} does not belong to load {load}").into());
        }
        let stored = state
            .loads
            .get_mut(&load)
            .ok_or_else(|| anyhow!("load {load} does not exist"))?;

        // The uniqueness invariant: assignment only succeeds while no
        // winning bid is recorded.
        if stored.winning_bid_id.is_some() {
            return Err(AssignmentError::AlreadyAssigned);
        }
        stored.winning_bid_id = Some(bid);
        stored.status = LoadStatus::Assigned;

        for candidate in state.bids.values_mut() {
            if candidate.id == bid {
                candidate.state = BidState::Accepted;
            } else if candidate.load_id == load && candidate.state == BidState::Pending {
                candidate.state = BidState::Rejected;
            }
        }

        Ok(())
    }

    async fn read_load(&self, load: LoadId) -> Result<Option<Load>> {
        Ok(self.state.lock().unwrap().loads.get(&load).cloned())
    }

    async fn read_bid(&self, bid: BidId) -> Result<Option<Bid>> {
        Ok(self.state.lock().unwrap().bids.get(&bid).cloned())
    }

    async fn set_load_open(&self, load: LoadId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let winning = {
            let stored = state
                .loads
                .get_mut(&load)
                .with_context(|| format!("load {load} does not exist"))?;
            let winning = stored.winning_bid_id.take();
            stored.status = LoadStatus::Open;
            winning
        };
        if let Some(bid) = winning.and_then(|id| state.bids.get_mut(&id)) {
            bid.state = BidState::Expired;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LockStoring for InMemoryStorage {
    async fn try_acquire(&self, key: LoadId, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        match state.lock_deadlines.get(&key) {
            Some(deadline) if *deadline > now => Ok(false),
            _ => {
                state.lock_deadlines.insert(key, now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: LoadId) -> Result<()> {
        self.state.lock().unwrap().lock_deadlines.remove(&key);
        Ok(())
    }

    async fn is_held(&self, key: LoadId) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .lock_deadlines
            .get(&key)
            .is_some_and(|deadline| *deadline > Instant::now()))
    }

    async fn remaining_ttl(&self, key: LoadId) -> Result<Option<Duration>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .lock_deadlines
            .get(&key)
            .and_then(|deadline| deadline.checked_duration_since(Instant::now())))
    }
}

#[async_trait::async_trait]
impl WorkflowStoring for InMemoryStorage {
    async fn insert(&self, new: NewRateConfirmation) -> Result<RateConfirmation> {
        let mut state = self.state.lock().unwrap();
        state.next_workflow_id += 1;
        let workflow = RateConfirmation {
            id: WorkflowId(state.next_workflow_id),
            load_id: new.load_id,
            bid_id: new.bid_id,
            carrier_id: new.carrier_id,
            status: RateConfirmationStatus::Generated,
            dispatch_signed_at: None,
            driver_acceptance_deadline: None,
            driver_accepted_at: None,
            document_reference: new.document_reference,
        };
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get(&self, id: WorkflowId) -> Result<Option<RateConfirmation>> {
        Ok(self.state.lock().unwrap().workflows.get(&id).cloned())
    }

    async fn mark_dispatch_signed(
        &self,
        id: WorkflowId,
        signed_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Option<RateConfirmation>> {
        let mut state = self.state.lock().unwrap();
        let Some(workflow) = state.workflows.get_mut(&id) else {
            return Ok(None);
        };
        if workflow.status != RateConfirmationStatus::Generated {
            return Ok(None);
        }
        workflow.status = RateConfirmationStatus::DispatchSigned;
        workflow.dispatch_signed_at = Some(signed_at);
        workflow.driver_acceptance_deadline = Some(deadline);
        Ok(Some(workflow.clone()))
    }

    async fn finalize(
        &self,
        id: WorkflowId,
        to: RateConfirmationStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<RateConfirmation>> {
        anyhow::ensure!(to.is_terminal(), "finalize target {to:?} is not terminal");
        let mut state = self.state.lock().unwrap();
        let Some(workflow) = state.workflows.get_mut(&id) else {
            return Ok(None);
        };
        if workflow.status != RateConfirmationStatus::DispatchSigned {
            return Ok(None);
        }
        workflow.status = to;
        if to == RateConfirmationStatus::DriverAccepted {
            workflow.driver_accepted_at = Some(at);
        }
        Ok(Some(workflow.clone()))
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<RateConfirmation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .workflows
            .values()
            .filter(|workflow| {
                workflow.status == RateConfirmationStatus::DispatchSigned
                    && workflow.past_deadline(now)
            })
            .cloned()
            .collect())
    }
}
