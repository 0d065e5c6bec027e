use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Units of a corridor's fiat currency per US dollar.
///
/// Valid until superseded by a newer fetch for the same corridor. `corridor`
/// is always the display code, never the code the feed was queried with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateQuote {
    pub corridor: String,
    pub fiat_per_usd: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl RateQuote {
    pub fn new(corridor: &str, fiat_per_usd: Decimal) -> Self {
        Self {
            corridor: corridor.to_string(),
            fiat_per_usd,
            fetched_at: Utc::now(),
        }
    }
}
