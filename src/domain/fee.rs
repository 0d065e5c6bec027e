use crate::domain::money::round_to;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// One named deduction shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub name: String,
    pub amount: Decimal,
}

impl LineItem {
    pub fn new(name: &str, amount: Decimal) -> Self {
        Self {
            name: name.to_string(),
            amount,
        }
    }
}

/// A percentage deduction, expressed as a fraction (`0.02` is 2%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeStage {
    pub name: String,
    pub rate: Decimal,
}

/// Ordered deductions applied to a gross amount.
///
/// Percentage stages compound: each one is taken from what the previous
/// stages left. Fixed deductions are subtracted afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeeModel {
    stages: Vec<FeeStage>,
    fixed: Vec<LineItem>,
}

pub const VOLATILITY_BUFFER: &str = "Volatility buffer";
pub const MARGIN: &str = "Margin";
pub const PROCESSING_FEE: &str = "Processing fee";
pub const NETWORK_FEE: &str = "Network fee";

impl FeeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, name: &str, rate: Decimal) -> Self {
        self.stages.push(FeeStage {
            name: name.to_string(),
            rate,
        });
        self
    }

    pub fn fixed(mut self, name: &str, amount: Decimal) -> Self {
        self.fixed.push(LineItem::new(name, amount));
        self
    }

    /// Two 2% deductions: a volatility buffer, then the margin.
    pub fn off_ramp() -> Self {
        Self::off_ramp_with(dec!(0.02), dec!(0.02))
    }

    pub fn off_ramp_with(volatility_buffer: Decimal, margin: Decimal) -> Self {
        Self::new()
            .stage(VOLATILITY_BUFFER, volatility_buffer)
            .stage(MARGIN, margin)
    }

    /// A 2% processing fee; the network fee is added per quote with
    /// [`FeeModel::fixed`].
    pub fn on_ramp() -> Self {
        Self::on_ramp_with(dec!(0.02))
    }

    pub fn on_ramp_with(processing_fee: Decimal) -> Self {
        Self::new().stage(PROCESSING_FEE, processing_fee)
    }

    pub fn stages(&self) -> &[FeeStage] {
        &self.stages
    }

    /// Deducts every stage from `gross`, rounding each deduction to
    /// `decimals` places. The net never drops below zero.
    pub fn apply(&self, gross: Decimal, decimals: u32) -> (Vec<LineItem>, Decimal) {
        let mut remaining = gross;
        let mut items = Vec::with_capacity(self.stages.len() + self.fixed.len());

        for stage in &self.stages {
            let deducted = round_to(remaining * stage.rate, decimals);
            remaining -= deducted;
            items.push(LineItem::new(&stage.name, deducted));
        }
        for fee in &self.fixed {
            let deducted = round_to(fee.amount, decimals);
            remaining -= deducted;
            items.push(LineItem::new(&fee.name, deducted));
        }

        (items, remaining.max(Decimal::ZERO))
    }
}
