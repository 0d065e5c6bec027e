mod common;

use common::{default_feed, filled_off_ramp, harness};
use rampflow::application::orchestrator::FlowState;
use rampflow::domain::transaction::Direction;
use rampflow::error::{Field, RampError};
use rampflow::infrastructure::in_memory::{ScriptedWallet, StaticRateFeed};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn slow_feed() -> StaticRateFeed {
    default_feed()
        .with_delay("UGX", Duration::from_secs(3))
        .with_delay("KES", Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_latest_corridor_selection_wins() {
    let h = harness(Direction::OffRamp, slow_feed(), ScriptedWallet::approving("0xfeed"));
    h.flow.set_mobile_number("0772123456");

    h.flow.select_corridor("UGX").unwrap();
    h.flow.select_corridor("KSH").unwrap();
    assert_eq!(h.flow.corridor(), "KSH");
    assert_eq!(h.flow.payout_method().as_deref(), Some("mpesa"));
    assert_eq!(h.flow.mobile_number(), "");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.rates.selected_corridor().as_deref(), Some("KSH"));
    assert_eq!(h.rates.current_quote("KSH").unwrap().fiat_per_usd, dec!(129));
    assert!(matches!(
        h.rates.current_quote("UGX"),
        Err(RampError::RateUnavailable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_slow_result_for_previous_corridor_is_discarded() {
    let h = harness(Direction::OffRamp, slow_feed(), ScriptedWallet::approving("0xfeed"));
    let rates = Arc::clone(&h.rates);

    let (slow, fast) = tokio::join!(rates.refresh("UGX"), rates.refresh("KSH"));

    assert_eq!(fast.unwrap().unwrap().fiat_per_usd, dec!(129));
    // UGX answers two seconds after KSH, when it is no longer selected.
    assert!(slow.unwrap().is_none());

    assert_eq!(rates.current_quote("KSH").unwrap().fiat_per_usd, dec!(129));
    assert!(rates.current_quote("UGX").is_err());
    assert_eq!(h.feed.fiat_requests(), ["UGX", "KES"]);
}

#[tokio::test]
async fn test_unknown_corridor_is_rejected() {
    let h = harness(Direction::OffRamp, default_feed(), ScriptedWallet::approving("0xfeed"));
    assert!(matches!(
        h.flow.select_corridor("EUR"),
        Err(RampError::Validation(Field::Corridor))
    ));
    assert_eq!(h.flow.corridor(), "UGX");
}

#[tokio::test(start_paused = true)]
async fn test_missing_rate_blocks_submission() {
    let feed = default_feed();
    feed.remove_rate("UGX");
    let h = filled_off_ramp(feed, ScriptedWallet::approving("0xfeed"));

    assert!(matches!(h.flow.refresh_rate().await, Err(RampError::RateUnavailable(_))));
    let err = h.flow.submit().await.unwrap_err();
    assert!(matches!(err, RampError::RateUnavailable(_)));
    assert_eq!(h.flow.state(), FlowState::Idle);
    assert!(h.wallet.requests().is_empty());
    assert!(h.backend.is_empty().await);
}
