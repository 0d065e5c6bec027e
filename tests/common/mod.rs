#![allow(dead_code)]

use rampflow::application::calculator::ConversionCalculator;
use rampflow::application::orchestrator::{FlowDeps, FlowSettings, RampFlowOrchestrator};
use rampflow::application::rates::RateOracleClient;
use rampflow::domain::chain::{BASE, ChainTokenRegistry};
use rampflow::domain::corridor::PayoutCorridorRegistry;
use rampflow::domain::transaction::Direction;
use rampflow::infrastructure::in_memory::{InMemoryBackend, ScriptedWallet, StaticRateFeed};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const TREASURY: &str = "0xDD463C81cb2fA0e95b55c5d7696d8a9755cb1Af2";
pub const USER_WALLET: &str = "0x9f2c3a8e41b7d05e6c1a2b3c4d5e6f708192a3b4";

pub struct Harness {
    pub flow: RampFlowOrchestrator,
    pub backend: InMemoryBackend,
    pub feed: StaticRateFeed,
    pub wallet: ScriptedWallet,
    pub rates: Arc<RateOracleClient>,
}

/// Feed with the rates and prices the flows below need.
pub fn default_feed() -> StaticRateFeed {
    StaticRateFeed::new()
        .with_rate("UGX", dec!(3850))
        .with_rate("KES", dec!(129))
        .with_rate("RWF", dec!(1300))
        .with_usd_price("ethereum", dec!(3000))
        .with_gas_price(BASE, 1_000_000_000)
}

pub fn harness(direction: Direction, feed: StaticRateFeed, wallet: ScriptedWallet) -> Harness {
    let backend = InMemoryBackend::new();
    let corridors = Arc::new(PayoutCorridorRegistry::builtin());
    let rates = Arc::new(RateOracleClient::new(
        Arc::new(feed.clone()),
        Arc::clone(&corridors),
    ));
    let deps = FlowDeps {
        tokens: Arc::new(ChainTokenRegistry::builtin()),
        corridors,
        rates: Arc::clone(&rates),
        calculator: ConversionCalculator::default(),
        backend: Arc::new(backend.clone()),
        wallet: Some(Arc::new(wallet.clone())),
    };
    let flow = RampFlowOrchestrator::new(direction, deps, FlowSettings::default());
    Harness {
        flow,
        backend,
        feed,
        wallet,
        rates,
    }
}

/// Off-ramp of 5 USDC on Base to an MTN Uganda number.
pub fn filled_off_ramp(feed: StaticRateFeed, wallet: ScriptedWallet) -> Harness {
    let harness = harness(Direction::OffRamp, feed, wallet);
    let flow = &harness.flow;
    flow.set_chain(BASE);
    flow.set_wallet_address(USER_WALLET);
    flow.set_available_balance(dec!(12.5));
    flow.set_amount(dec!(5));
    flow.select_payout_method("mtn").unwrap();
    flow.set_mobile_number("+256 772 123 456");
    flow.set_email("amina@example.com");
    harness
}

/// On-ramp paying 38500 UGX for USDC on Base, proof already uploaded.
pub fn filled_on_ramp(feed: StaticRateFeed) -> Harness {
    let harness = harness(Direction::OnRamp, feed, ScriptedWallet::approving("0xunused"));
    let flow = &harness.flow;
    flow.set_chain(BASE);
    flow.set_wallet_address(USER_WALLET);
    flow.set_amount(dec!(38500));
    flow.select_payout_method("airtel").unwrap();
    flow.set_mobile_number("0752 123 456");
    flow.set_email("amina@example.com");
    flow.set_proof_url("https://res.cloudinary.com/demo/image/upload/proof.png");
    harness
}
