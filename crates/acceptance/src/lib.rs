//! Arbitration of concurrent bid-accept attempts.
//!
//! The advisory [`lock::AcceptanceLock`] keeps concurrent attempts on the
//! same load from hammering the store; the store's uniqueness invariant is
//! what actually guarantees at most one winner. When the two disagree the
//! store wins.

pub mod arbiter;
pub mod lock;

pub use {
    arbiter::{AcceptError, Acceptance, AcceptanceArbiter},
    lock::AcceptanceLock,
};
