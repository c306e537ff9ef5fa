//! Ledger network client boundary and its JSON-RPC implementation.

/// JSON-RPC ledger client.
mod rpc;
/// Shared ledger types, errors, and the client trait.
mod types;

pub use rpc::{JsonRpcLedgerClient, LedgerRpcConfig};
pub use types::{BlockReference, LedgerClient, SimulationOutcome, TransportError, TxStatus};
