use crate::domain::chain::TokenSymbol;
use crate::domain::fee::{FeeModel, LineItem, NETWORK_FEE};
use crate::domain::money::{Amount, FIAT_DECIMALS, from_minor_units, round_fiat, round_to};
use crate::domain::rate::RateQuote;
use crate::error::{Field, RampError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Itemized result of a conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub gross: Decimal,
    pub line_items: Vec<LineItem>,
    pub net: Decimal,
}

/// Inputs for pricing the on-chain payout of an on-ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkFeeParams {
    pub gas_limit: u64,
    /// Flat amount in US dollars added on top of the gas cost.
    pub surcharge_usd: Decimal,
}

impl Default for NetworkFeeParams {
    fn default() -> Self {
        Self {
            gas_limit: 65_000,
            surcharge_usd: dec!(0.01),
        }
    }
}

/// Decimal places token-side conversion results are rounded to.
pub fn token_precision(token: TokenSymbol) -> u32 {
    token.decimals().min(8)
}

/// Amounts too large for `Decimal` once priced are rejected as invalid input.
fn amount_overflow() -> RampError {
    RampError::Validation(Field::Amount)
}

fn usable_rate(quote: &RateQuote) -> Result<Decimal> {
    if quote.fiat_per_usd > Decimal::ZERO {
        Ok(quote.fiat_per_usd)
    } else {
        Err(RampError::RateUnavailable(quote.corridor.clone()))
    }
}

/// Token amount to fiat for a USD-pegged token.
pub fn token_to_fiat(amount: Amount, quote: &RateQuote, fees: &FeeModel) -> Result<Conversion> {
    token_to_fiat_priced(amount, Decimal::ONE, quote, fees)
}

/// Token amount to fiat through the token's US dollar price.
pub fn token_to_fiat_priced(
    amount: Amount,
    token_usd: Decimal,
    quote: &RateQuote,
    fees: &FeeModel,
) -> Result<Conversion> {
    let rate = usable_rate(quote)?;
    if token_usd <= Decimal::ZERO {
        return Err(RampError::RateUnavailable(quote.corridor.clone()));
    }

    let gross = amount
        .value()
        .checked_mul(token_usd)
        .and_then(|usd| usd.checked_mul(rate))
        .map(round_fiat)
        .ok_or_else(amount_overflow)?;
    let (line_items, net) = fees.apply(gross, FIAT_DECIMALS);
    Ok(Conversion {
        gross,
        line_items,
        net,
    })
}

/// Fiat amount to token units of `token`, priced at `token_usd` dollars.
pub fn fiat_to_token(
    amount: Amount,
    quote: &RateQuote,
    token_usd: Decimal,
    fees: &FeeModel,
    token: TokenSymbol,
) -> Result<Conversion> {
    let rate = usable_rate(quote)?;
    if token_usd <= Decimal::ZERO {
        return Err(RampError::RateUnavailable(quote.corridor.clone()));
    }

    let precision = token_precision(token);
    let gross = amount
        .value()
        .checked_div(rate)
        .and_then(|usd| usd.checked_div(token_usd))
        .map(|gross| round_to(gross, precision))
        .ok_or_else(amount_overflow)?;
    let (line_items, net) = fees.apply(gross, precision);
    Ok(Conversion {
        gross,
        line_items,
        net,
    })
}

/// `balance * percentage / 100` rounded for display (4 places for 18-decimal
/// assets, 2 otherwise) without trailing zeros. `None` when there is no
/// balance to take a share of or the share does not fit a `Decimal`.
pub fn quick_amount(balance: Decimal, percentage: Decimal, token: TokenSymbol) -> Option<String> {
    if balance <= Decimal::ZERO {
        return None;
    }
    let share = balance.checked_mul(percentage)?.checked_div(dec!(100))?;
    let share = round_to(share, token.display_precision());
    Some(share.normalize().to_string())
}

/// Positive and no larger than the available balance.
pub fn is_within_balance(amount: Decimal, balance: Decimal) -> bool {
    amount > Decimal::ZERO && amount <= balance
}

/// Fee schedule for both ramp directions.
#[derive(Debug, Clone)]
pub struct ConversionCalculator {
    off_ramp_fees: FeeModel,
    on_ramp_fees: FeeModel,
    network: NetworkFeeParams,
}

impl Default for ConversionCalculator {
    fn default() -> Self {
        Self::new(
            FeeModel::off_ramp(),
            FeeModel::on_ramp(),
            NetworkFeeParams::default(),
        )
    }
}

impl ConversionCalculator {
    pub fn new(off_ramp_fees: FeeModel, on_ramp_fees: FeeModel, network: NetworkFeeParams) -> Self {
        Self {
            off_ramp_fees,
            on_ramp_fees,
            network,
        }
    }

    pub fn off_ramp_fees(&self) -> &FeeModel {
        &self.off_ramp_fees
    }

    /// What the user receives in fiat for selling `amount` tokens.
    pub fn off_ramp_quote(
        &self,
        amount: Amount,
        token_usd: Decimal,
        quote: &RateQuote,
    ) -> Result<Conversion> {
        token_to_fiat_priced(amount, token_usd, quote, &self.off_ramp_fees)
    }

    /// Tokens the user receives for paying `amount` fiat, after the
    /// processing fee and the payout's network fee.
    pub fn on_ramp_quote(
        &self,
        amount: Amount,
        quote: &RateQuote,
        token: TokenSymbol,
        token_usd: Decimal,
        network_fee: Decimal,
    ) -> Result<Conversion> {
        let fees = self.on_ramp_fees.clone().fixed(NETWORK_FEE, network_fee);
        fiat_to_token(amount, quote, token_usd, &fees, token)
    }

    /// Network fee of the payout transfer, in units of the paid-out token.
    pub fn network_fee(
        &self,
        gas_price_wei: u128,
        native_usd: Decimal,
        token_usd: Decimal,
        token: TokenSymbol,
    ) -> Result<Decimal> {
        let gas_price = from_minor_units(gas_price_wei, 18)
            .ok_or_else(|| RampError::RateUnavailable("gas price".to_string()))?;
        if token_usd <= Decimal::ZERO {
            return Err(RampError::RateUnavailable(token.to_string()));
        }
        let fee = gas_price
            .checked_mul(Decimal::from(self.network.gas_limit))
            .and_then(|gas| gas.checked_mul(native_usd))
            .and_then(|usd| usd.checked_add(self.network.surcharge_usd))
            .and_then(|usd| usd.checked_div(token_usd))
            .ok_or_else(|| RampError::RateUnavailable(format!("network fee in {token}")))?;
        Ok(round_to(fee, token_precision(token)))
    }
}
