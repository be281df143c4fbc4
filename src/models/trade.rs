use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Outcome, Side};

/// A single fill by a wallet in a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub wallet: String,
    pub market_id: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Option<Decimal>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Notional in USD. `None` when the trade carries no usable price or
    /// the notional does not fit a `Decimal`.
    pub fn value_usd(&self) -> Option<Decimal> {
        self.price
            .filter(|p| *p > Decimal::ZERO)
            .and_then(|p| self.size.checked_mul(p))
    }

    /// Unrealized profit of the fill against a reference price.
    /// BUY profits when the price rises, SELL when it falls.
    pub fn pnl_against(&self, mark: Decimal) -> Option<Decimal> {
        let entry = self.price.filter(|p| *p > Decimal::ZERO)?;
        let move_per_share = match self.side {
            Side::Buy => mark.checked_sub(entry)?,
            Side::Sell => entry.checked_sub(mark)?,
        };
        self.size.checked_mul(move_per_share)
    }
}
