use {
    crate::{bid::BidId, load::LoadId},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{
        fmt::{self, Display},
        num::ParseIntError,
        str::FromStr,
    },
};

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkflowId(pub i64);

impl Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateConfirmationStatus {
    /// The confirmation document was produced but dispatch has not signed
    /// yet. Transient; the workflow advances automatically.
    Generated,
    /// Dispatch signed; the assigned driver has until
    /// `driver_acceptance_deadline` to decide.
    DispatchSigned,
    DriverAccepted,
    Rejected,
    Expired,
}

impl RateConfirmationStatus {
    /// Terminal statuses are immutable; no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DriverAccepted | Self::Rejected | Self::Expired
        )
    }
}

/// The workflow formalizing a carrier/driver's commitment to an assigned
/// load. Created when a bid is accepted, closed by the driver's decision or
/// by the expiry sweep.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateConfirmation {
    pub id: WorkflowId,
    pub load_id: LoadId,
    pub bid_id: BidId,
    pub carrier_id: String,
    pub status: RateConfirmationStatus,
    pub dispatch_signed_at: Option<DateTime<Utc>>,
    pub driver_acceptance_deadline: Option<DateTime<Utc>>,
    pub driver_accepted_at: Option<DateTime<Utc>>,
    /// Opaque reference to the rendered confirmation document.
    pub document_reference: String,
}

impl RateConfirmation {
    pub fn past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.driver_acceptance_deadline
            .is_some_and(|deadline| now >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        use RateConfirmationStatus::*;
        assert!(!Generated.is_terminal());
        assert!(!DispatchSigned.is_terminal());
        assert!(DriverAccepted.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(Expired.is_terminal());
    }

    #[test]
    fn deadline_comparison_is_inclusive() {
        let deadline = Utc::now();
        let workflow = RateConfirmation {
            id: WorkflowId(1),
            load_id: LoadId(1),
            bid_id: BidId(1),
            carrier_id: "carrier".to_string(),
            status: RateConfirmationStatus::DispatchSigned,
            dispatch_signed_at: Some(deadline - chrono::Duration::minutes(30)),
            driver_acceptance_deadline: Some(deadline),
            driver_accepted_at: None,
            document_reference: "ratecon-1".to_string(),
        };
        assert!(workflow.past_deadline(deadline));
        assert!(!workflow.past_deadline(deadline - chrono::Duration::seconds(1)));
    }
}
