use crate::error::{Field, RampError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A strictly positive amount entered by the user.
///
/// Wraps `rust_decimal::Decimal` so that zero and negative values can never
/// reach the calculator or the backend.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, RampError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RampError::Validation(Field::Amount))
        }
    }

    /// Parses free-form user input, ignoring surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, RampError> {
        let value =
            Decimal::from_str(input.trim()).map_err(|_| RampError::Validation(Field::Amount))?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = RampError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Fiat amounts are carried with two decimal places.
pub const FIAT_DECIMALS: u32 = 2;

pub fn round_fiat(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(FIAT_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_to(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a token amount into the integer unit a wallet transfers
/// (wei for 18-decimal assets).
///
/// Amounts carrying more fractional digits than the token supports are
/// rejected rather than silently truncated.
pub fn to_minor_units(amount: Amount, decimals: u32) -> Result<u128, RampError> {
    let value = amount.value().normalize();
    if value.scale() > decimals {
        return Err(RampError::Validation(Field::Amount));
    }

    // Decimal cannot hold 10^18 * large amounts, so scale the mantissa by hand.
    let mantissa = value.mantissa();
    let exponent = decimals - value.scale();
    let factor = 10u128
        .checked_pow(exponent)
        .ok_or(RampError::Validation(Field::Amount))?;
    u128::try_from(mantissa)
        .ok()
        .and_then(|m| m.checked_mul(factor))
        .ok_or(RampError::Validation(Field::Amount))
}

/// Inverse of [`to_minor_units`] for amounts that fit a `Decimal`.
pub fn from_minor_units(units: u128, decimals: u32) -> Option<Decimal> {
    let units = i128::try_from(units).ok()?;
    Decimal::try_from_i128_with_scale(units, decimals).ok()
}

/// Syntactic email check: one `@`, a non-empty local part and a dotted
/// domain without empty labels.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}
