//! Adapters behind the domain ports: HTTP clients for the transaction
//! service, price feeds and image host, plus in-process stand-ins.

pub mod http;
pub mod in_memory;
pub mod wallet;
