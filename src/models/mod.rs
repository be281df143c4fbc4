pub mod market;
pub mod position;
pub mod selection;
pub mod trade;
pub mod wallet;

pub use market::{ClusterKey, Market, PricePoint};
pub use position::WalletPosition;
pub use selection::{ScoredMarket, SelectedMarket};
pub use trade::Trade;
pub use wallet::WalletProfile;

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "0" => Some(Side::Buy),
            "SELL" | "1" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Which side of a binary market a holding sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
    Unknown,
}

impl Outcome {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "yes" => Outcome::Yes,
            "no" => Outcome::No,
            _ => Outcome::Unknown,
        }
    }

    /// Binary markets list outcomes as ["Yes", "No"].
    pub fn from_index(index: u64) -> Self {
        match index {
            0 => Outcome::Yes,
            1 => Outcome::No,
            _ => Outcome::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "Yes",
            Outcome::No => "No",
            Outcome::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
