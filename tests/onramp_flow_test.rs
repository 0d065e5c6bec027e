mod common;

use common::{USER_WALLET, default_feed, filled_on_ramp};
use rampflow::application::orchestrator::{FlowState, Outcome};
use rampflow::domain::chain::{BASE, TokenSymbol};
use rampflow::domain::fee::{NETWORK_FEE, PROCESSING_FEE};
use rampflow::domain::transaction::{Direction, TransactionStatus};
use rampflow::error::{Field, RampError};
use rampflow::infrastructure::in_memory::{ScriptedWallet, StaticRateFeed};
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_on_ramp_requires_proof_of_payment() {
    let h = common::harness(
        Direction::OnRamp,
        default_feed(),
        ScriptedWallet::approving("0xunused"),
    );
    h.flow.set_chain(BASE);
    h.flow.set_wallet_address(USER_WALLET);
    h.flow.set_amount(dec!(38500));
    h.flow.set_mobile_number("0772123456");
    h.flow.set_email("amina@example.com");

    assert!(!h.flow.can_submit());
    let err = h.flow.submit().await.unwrap_err();
    assert!(matches!(err, RampError::Validation(Field::ProofOfPayment)));
    assert_eq!(h.flow.state(), FlowState::Idle);
    assert!(h.backend.is_empty().await);

    h.flow.set_proof_url("https://res.cloudinary.com/demo/image/upload/proof.png");
    assert!(h.flow.can_submit());
}

#[tokio::test(start_paused = true)]
async fn test_on_ramp_quote_deducts_processing_and_network_fee() {
    let h = filled_on_ramp(default_feed());
    let conversion = h.flow.quote().await.unwrap();

    assert_eq!(conversion.gross, dec!(10));
    assert_eq!(conversion.line_items.len(), 2);
    assert_eq!(conversion.line_items[0].name, PROCESSING_FEE);
    assert_eq!(conversion.line_items[0].amount, dec!(0.2));
    assert_eq!(conversion.line_items[1].name, NETWORK_FEE);
    assert_eq!(conversion.line_items[1].amount, dec!(0.205));
    assert_eq!(conversion.net, dec!(9.595));
}

#[tokio::test(start_paused = true)]
async fn test_on_ramp_submits_without_touching_the_wallet() {
    let h = filled_on_ramp(default_feed());
    let id = h.flow.submit().await.unwrap();
    assert_eq!(h.flow.state(), FlowState::Polling(id.clone()));
    assert!(h.wallet.requests().is_empty());

    let stored = h.backend.get(&id).await.unwrap();
    assert_eq!(stored.direction, Direction::OnRamp);
    assert_eq!(stored.token_amount, dec!(9.595));
    assert_eq!(stored.fiat_amount, dec!(38500));
    assert_eq!(stored.fiat_currency, "UGX");
    assert_eq!(stored.payout_method, "airtel");
    assert_eq!(stored.mobile_number, "0752123456");
    assert_eq!(stored.recipient_address, USER_WALLET);
    assert_eq!(
        stored.image_url.as_deref(),
        Some("https://res.cloudinary.com/demo/image/upload/proof.png")
    );
    assert_eq!(stored.tx_hash, None);

    h.backend.set_status(&id, TransactionStatus::Confirmed).await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.flow.state(), FlowState::Terminal(Outcome::Succeeded));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.flow.state(), FlowState::Idle);
    assert_eq!(h.flow.proof_url(), None);
    assert_eq!(h.flow.corridor(), "UGX");
    assert_eq!(h.flow.payout_method().as_deref(), Some("mtn"));
    assert_eq!(h.flow.token(), Some(TokenSymbol::Usdc));
}

#[tokio::test(start_paused = true)]
async fn test_on_ramp_without_gas_price_is_not_submitted() {
    let feed = StaticRateFeed::new()
        .with_rate("UGX", dec!(3850))
        .with_usd_price("ethereum", dec!(3000));
    let h = filled_on_ramp(feed);

    let err = h.flow.submit().await.unwrap_err();
    assert!(matches!(err, RampError::RateUnavailable(_)));
    assert_eq!(h.flow.state(), FlowState::Idle);
    assert!(h.flow.last_error().is_some());
    assert!(h.backend.is_empty().await);
}
