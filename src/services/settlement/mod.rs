//! Settlement bridge.
//!
//! Converts matched trades into CTF exchange contract calls and broadcasts
//! them with the operator key. The bridge itself is not idempotent; the
//! recorded transaction id on the trade is the at-most-once guard.

pub mod service;
pub mod types;

pub use service::SettlementService;
pub use types::{SettlementError, SettlementRequest};
