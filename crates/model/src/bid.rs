use {
    crate::load::LoadId,
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
pub struct BidId(pub i64);

impl Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BidId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BidState {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// A carrier's priced offer to haul a specific load. Amounts are stored in
/// cents to avoid floating point in money math.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub load_id: LoadId,
    pub carrier_id: String,
    pub amount_cents: i64,
    pub state: BidState,
}
