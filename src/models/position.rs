use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Outcome;

/// A wallet's holding in one outcome of a market.
///
/// `value_usd` is `None` only when neither the API nor any implied price
/// gave a value; it is never replaced by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletPosition {
    pub wallet: String,
    pub market_id: String,
    pub outcome: Outcome,
    pub size: Decimal,
    /// Average entry price, when the API reports one.
    pub avg_price: Option<Decimal>,
    pub value_usd: Option<Decimal>,
    /// When the wallet was first seen on the platform, if the row says.
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
}

impl WalletPosition {
    /// Current value minus cost basis, if both are known.
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        let value = self.value_usd?;
        let entry = self.avg_price.filter(|p| *p > Decimal::ZERO)?;
        value.checked_sub(self.size.checked_mul(entry)?)
    }
}
