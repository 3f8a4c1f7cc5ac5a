//! The rate-confirmation acceptance workflow.
//!
//! A workflow is created when a bid is accepted, auto-advances to
//! dispatch-signed, and then waits for the assigned driver to accept or
//! reject within a bounded window. The [`sweep::ExpirySweeper`] expires
//! workflows whose window lapsed and returns their loads to the
//! marketplace.

pub mod confirmation;
pub mod sweep;
pub mod traits;

pub use {
    confirmation::{DecisionError, RateConfirmations},
    sweep::{ExpirySweeper, SweeperHandle},
    traits::Notifying,
};
