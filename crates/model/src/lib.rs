//! Domain types shared between the marketplace services.

pub mod bid;
pub mod load;
pub mod rate_confirmation;

pub use {
    bid::{Bid, BidId, BidState},
    load::{Load, LoadId, LoadStatus},
    rate_confirmation::{RateConfirmation, RateConfirmationStatus, WorkflowId},
};
