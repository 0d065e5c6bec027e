//! Application layer: pricing, rate caching, submission, status polling and
//! the flow state machine that ties them together.
//!
//! Everything here talks to the outside world only through the ports in
//! [`crate::domain::ports`], so the same flow runs against the HTTP adapters
//! or the in-memory ones used in tests.

pub mod calculator;
pub mod orchestrator;
pub mod poller;
pub mod rates;
pub mod submitter;
