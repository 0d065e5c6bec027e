//! Domain layer: value types, registries and the ports the application
//! layer talks to. Nothing in here performs I/O.

pub mod chain;
pub mod corridor;
pub mod fee;
pub mod money;
pub mod ports;
pub mod rate;
pub mod transaction;
