//! bridge-warden - relay engine for a two-chain bridge pair
//!
//! Watches `Deposit` events on the source chain and relays each as exactly
//! one `wrap` call on the destination chain; watches `Unwrap` events on the
//! destination chain and relays each as exactly one `withdraw` call on the
//! source chain. Discovery is at-least-once (re-scans absorb reorgs); the
//! dedup store makes relaying effectively-once, and per-chain nonce
//! sequencing keeps outbound transactions strictly ordered.

pub mod api;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod evm;
pub mod metrics;
pub mod nonce;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod submitter;
pub mod types;
pub mod watcher;
