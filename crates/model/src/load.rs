use {
    crate::bid::BidId,
    serde::{Deserialize, Serialize},
    std::{
        fmt::{self, Display},
        num::ParseIntError,
        str::FromStr,
    },
};

/// Database identifier of a load (a shipment open for bidding).
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LoadId(pub i64);

impl Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LoadId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStatus {
    #[default]
    Open,
    Assigned,
    InTransit,
    Completed,
    Cancelled,
}

/// A shipment posted to the marketplace. Open for bidding until a winning
/// bid is assigned; at most one bid ever wins.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    pub id: LoadId,
    pub status: LoadStatus,
    pub winning_bid_id: Option<BidId>,
}
