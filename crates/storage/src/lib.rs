//! Durable and ephemeral stores backing the acceptance core.
//!
//! The traits in [`traits`] are the only surface the services see. Two
//! implementations exist: [`postgres::Postgres`] for real deployments and
//! [`memory::InMemoryStorage`] for tests and single-node runs. Whatever the
//! backend, the store is the ultimate authority on winning-bid assignment;
//! the advisory acceptance lock merely reduces contention on it.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use {
    memory::InMemoryStorage,
    postgres::Postgres,
    traits::{AssignmentError, LoadStoring, LockStoring, NewRateConfirmation, WorkflowStoring},
};
