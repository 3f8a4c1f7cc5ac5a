use {
    crate::lock::AcceptanceLock,
    chrono::{DateTime, Utc},
    model::{BidId, LoadId},
    std::sync::Arc,
    storage::{AssignmentError, LoadStoring},
};

#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    /// Another accept attempt currently holds the load's lock. Whether to
    /// retry is the caller's decision; the arbiter never retries on its own.
    #[error("load is being processed by another request")]
    LockContention,
    /// The store's uniqueness invariant rejected the assignment: some
    /// attempt already won this load.
    #[error("load already has a winning bid")]
    AlreadyAssigned,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The outcome of a successful accept attempt, handed downstream to
/// rate-confirmation generation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Acceptance {
    pub load_id: LoadId,
    pub bid_id: BidId,
    pub actor_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Arbitrates concurrent attempts to accept competing bids on one load,
/// guaranteeing at most one winner.
pub struct AcceptanceArbiter {
    lock: AcceptanceLock,
    loads: Arc<dyn LoadStoring>,
}

impl AcceptanceArbiter {
    pub fn new(lock: AcceptanceLock, loads: Arc<dyn LoadStoring>) -> Self {
        Self { lock, loads }
    }

    /// Attempts to accept `bid` as the winning bid for `load`.
    ///
    /// Acquires the advisory lock (failing fast on contention), runs the
    /// all-or-nothing assignment transaction, and releases the lock again
    /// whatever the outcome. A constraint rejection surfaces as
    /// [`AcceptError::AlreadyAssigned`] even when we held the lock: the
    /// store is authoritative, the lock merely advisory.
    pub async fn attempt_accept(
        &self,
        load: LoadId,
        bid: BidId,
        actor_id: &str,
    ) -> Result<Acceptance, AcceptError> {
        let metrics = Metrics::get();
        if !self.lock.acquire(load).await {
            metrics.accept_attempts.with_label_values(&["contention"]).inc();
            return Err(AcceptError::LockContention);
        }

        let result = self.loads.assign_winning_bid(load, bid).await;
        // Unconditionally release before looking at the outcome so the lock
        // never outlives the attempt that took it.
        self.lock.release(load).await;

        match result {
            Ok(()) => {
                metrics.accept_attempts.with_label_values(&["accepted"]).inc();
                tracing::info!(%load, %bid, actor_id, "assigned winning bid");
                Ok(Acceptance {
                    load_id: load,
                    bid_id: bid,
                    actor_id: actor_id.to_string(),
                    accepted_at: Utc::now(),
                })
            }
            Err(AssignmentError::AlreadyAssigned) => {
                metrics
                    .accept_attempts
                    .with_label_values(&["already_assigned"])
                    .inc();
                tracing::debug!(%load, %bid, actor_id, "lost accept race");
                Err(AcceptError::AlreadyAssigned)
            }
            Err(AssignmentError::Other(err)) => {
                metrics.accept_attempts.with_label_values(&["error"]).inc();
                Err(AcceptError::Other(err))
            }
        }
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "acceptance")]
struct Metrics {
    /// Outcomes of bid accept attempts.
    #[metric(labels("result"))]
    accept_attempts: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        anyhow::bail,
        model::{Bid, BidState, Load, LoadStatus},
        std::time::Duration,
        storage::{LockStoring, memory::InMemoryStorage},
    };

    fn arbiter(storage: Arc<InMemoryStorage>) -> AcceptanceArbiter {
        let lock = AcceptanceLock::new(storage.clone(), Duration::from_secs(90));
        AcceptanceArbiter::new(lock, storage)
    }

    fn seed_competing_bids(storage: &InMemoryStorage) {
        storage.insert_load(Load {
            id: LoadId(1),
            status: LoadStatus::Open,
            winning_bid_id: None,
        });
        storage.insert_bid(Bid {
            id: BidId(1),
            load_id: LoadId(1),
            carrier_id: "carrier-a".to_string(),
            amount_cents: 50_000,
            state: BidState::Pending,
        });
        storage.insert_bid(Bid {
            id: BidId(2),
            load_id: LoadId(1),
            carrier_id: "carrier-b".to_string(),
            amount_cents: 48_000,
            state: BidState::Pending,
        });
    }

    #[tokio::test]
    async fn competing_accepts_have_exactly_one_winner() {
        let storage = Arc::new(InMemoryStorage::new());
        seed_competing_bids(&storage);
        let arbiter = Arc::new(arbiter(storage.clone()));

        let attempts = futures::future::join_all([
            {
                let arbiter = arbiter.clone();
                tokio::spawn(
                    async move { arbiter.attempt_accept(LoadId(1), BidId(1), "shipper").await },
                )
            },
            {
                let arbiter = arbiter.clone();
                tokio::spawn(
                    async move { arbiter.attempt_accept(LoadId(1), BidId(2), "shipper").await },
                )
            },
        ])
        .await;

        let (winners, losers): (Vec<_>, Vec<_>) = attempts
            .into_iter()
            .map(|handle| handle.unwrap())
            .partition(|outcome| outcome.is_ok());
        assert_eq!(winners.len(), 1);
        assert_eq!(losers.len(), 1);
        assert!(matches!(
            losers[0],
            Err(AcceptError::AlreadyAssigned | AcceptError::LockContention)
        ));

        let winning_bid = winners[0].as_ref().unwrap().bid_id;
        let load = storage.read_load(LoadId(1)).await.unwrap().unwrap();
        assert_eq!(load.status, LoadStatus::Assigned);
        assert_eq!(load.winning_bid_id, Some(winning_bid));

        // The winning transaction rejected the losing bid; never both
        // accepted.
        let losing_bid = if winning_bid == BidId(1) {
            BidId(2)
        } else {
            BidId(1)
        };
        let winner = storage.read_bid(winning_bid).await.unwrap().unwrap();
        let loser = storage.read_bid(losing_bid).await.unwrap().unwrap();
        assert_eq!(winner.state, BidState::Accepted);
        assert_eq!(loser.state, BidState::Rejected);
    }

    #[tokio::test]
    async fn many_concurrent_accepts_commit_at_most_once() {
        let storage = Arc::new(InMemoryStorage::new());
        seed_competing_bids(&storage);
        let arbiter = Arc::new(arbiter(storage.clone()));

        let attempts = (0..16i64).map(|i| {
            let arbiter = arbiter.clone();
            let bid = BidId(i % 2 + 1);
            tokio::spawn(async move { arbiter.attempt_accept(LoadId(1), bid, "shipper").await })
        });
        let outcomes = futures::future::join_all(attempts).await;

        let committed = outcomes
            .iter()
            .filter(|outcome| outcome.as_ref().unwrap().is_ok())
            .count();
        assert_eq!(committed, 1);
    }

    struct UnreachableLockStore;

    #[async_trait::async_trait]
    impl LockStoring for UnreachableLockStore {
        async fn try_acquire(&self, _: LoadId, _: Duration) -> anyhow::Result<bool> {
            bail!("connection refused")
        }

        async fn release(&self, _: LoadId) -> anyhow::Result<()> {
            bail!("connection refused")
        }

        async fn is_held(&self, _: LoadId) -> anyhow::Result<bool> {
            bail!("connection refused")
        }

        async fn remaining_ttl(&self, _: LoadId) -> anyhow::Result<Option<Duration>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn uniqueness_invariant_suffices_without_the_lock_store() {
        let storage = Arc::new(InMemoryStorage::new());
        seed_competing_bids(&storage);
        let lock = AcceptanceLock::new(Arc::new(UnreachableLockStore), Duration::from_secs(90));
        let arbiter = Arc::new(AcceptanceArbiter::new(lock, storage.clone()));

        // Every attempt fails open on the lock, so all of them reach the
        // store; the invariant still admits exactly one.
        let attempts = (0..8i64).map(|i| {
            let arbiter = arbiter.clone();
            let bid = BidId(i % 2 + 1);
            tokio::spawn(async move { arbiter.attempt_accept(LoadId(1), bid, "shipper").await })
        });
        let outcomes = futures::future::join_all(attempts).await;

        let mut committed = 0;
        for outcome in outcomes {
            match outcome.unwrap() {
                Ok(_) => committed += 1,
                Err(AcceptError::AlreadyAssigned) => {}
                Err(err) => panic!("unexpected error: {err:?}"),
            }
        }
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn accepting_an_unknown_bid_fails_without_assignment() {
        let storage = Arc::new(InMemoryStorage::new());
        seed_competing_bids(&storage);
        let arbiter = arbiter(storage.clone());

        let err = arbiter
            .attempt_accept(LoadId(1), BidId(99), "shipper")
            .await
            .unwrap_err();
        assert!(matches!(err, AcceptError::Other(_)));

        let load = storage.read_load(LoadId(1)).await.unwrap().unwrap();
        assert_eq!(load.winning_bid_id, None);
        // The failed attempt released its lock; a follow-up succeeds.
        arbiter
            .attempt_accept(LoadId(1), BidId(1), "shipper")
            .await
            .unwrap();
    }
}
