//! Atomic bundle dispatch with asynchronous relay result correlation.

/// Unmatched relay result cache.
mod cache;
/// Dispatcher and result pump.
mod engine;
/// Block-engine JSON-RPC relay client.
mod rpc;
/// Bundle payloads, results, errors, and the relay trait.
mod types;

pub use engine::{BundleDispatcher, DispatchConfig, PendingBundle};
pub use rpc::{JsonRpcRelayClient, RelayRpcConfig};
pub use types::{
    Bundle, BundleError, BundleId, BundleOutcome, BundleResult, BundleWait, DispatchError,
    MAX_BUNDLE_TRANSACTIONS, NO_LEADER_MESSAGE, RelayClient,
};
