#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::expect_used,
        clippy::indexing_slicing,
        clippy::missing_docs_in_private_items,
        clippy::panic,
        clippy::unwrap_used,
        missing_docs
    )
)]

//! Transaction landing for Solana: rebroadcast-until-terminal confirmation of single
//! transactions and atomic bundle dispatch with relay result correlation.

/// Bundle assembly, relay dispatch, and result correlation.
pub mod bundle;
/// Environment-driven configuration.
pub mod config;
/// Single-transaction confirmation engine.
pub mod confirm;
/// Shared JSON-RPC request plumbing.
mod jsonrpc;
/// Ledger collaborator trait and JSON-RPC client.
pub mod ledger;
/// Tracing subscriber setup.
pub mod logging;
/// Signed transaction payloads.
pub mod signed;

pub use bundle::{
    Bundle, BundleDispatcher, BundleError, BundleId, BundleOutcome, BundleResult, BundleWait,
    DispatchConfig, DispatchError, JsonRpcRelayClient, PendingBundle, RelayClient,
    RelayRpcConfig,
};
pub use config::{ConfigError, LandConfig};
pub use confirm::{
    BlockWaitError, ConfirmConfig, ConfirmationEngine, ConfirmationError, ConfirmationObserver,
    NoopObserver,
};
pub use ledger::{
    BlockReference, JsonRpcLedgerClient, LedgerClient, LedgerRpcConfig, SimulationOutcome,
    TransportError, TxStatus,
};
pub use signed::{SignedTransaction, SignedTransactionError};
