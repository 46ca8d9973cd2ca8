//! Vestinoo ledger: deposit webhook reconciliation, referral commissions,
//! offer-wall credits and balance claims, served from a Cloudflare Worker.
//!
//! The ledger logic compiles for every target and is tested against
//! [`memory::InMemoryStore`]; the Worker entrypoint, HTTP glue and the SeaORM
//! store only exist on wasm32.

pub mod bonus;
pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod money;
pub mod notify;
pub mod plans;
pub mod postback;
pub mod profit;
pub mod reconcile;
pub mod referral;
pub mod signature;
pub mod store;
pub mod util;

#[cfg(target_arch = "wasm32")]
mod worker_wasm;

#[cfg(target_arch = "wasm32")]
pub use worker_wasm::*;

/// This crate is intended to be built for Cloudflare Workers (wasm32-unknown-unknown).
///
/// Keeping a tiny non-wasm surface helps `cargo check` on typical dev machines.
#[cfg(not(target_arch = "wasm32"))]
pub fn build_target_hint() -> &'static str {
    "vestinoo-worker is intended for wasm32-unknown-unknown (Cloudflare Workers)"
}
