//! Shared ledger types, errors, and the network client trait.

use std::fmt;

use async_trait::async_trait;
use solana_hash::Hash;
use solana_signature::Signature;
use thiserror::Error;

/// Low-level transport errors surfaced by ledger and relay backends.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TransportError {
    /// Invalid transport configuration.
    #[error("transport configuration invalid: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },
    /// Transport operation failed.
    #[error("transport failure: {message}")]
    Failure {
        /// Human-readable description.
        message: String,
    },
}

impl TransportError {
    /// Returns the human-readable description carried by either variant.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message } | Self::Failure { message } => message,
        }
    }
}

/// Validity window of a transaction that embeds `blockhash`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlockReference {
    /// Recent blockhash.
    pub blockhash: Hash,
    /// Last block height at which a transaction using `blockhash` is accepted.
    pub last_valid_block_height: u64,
}

/// Lifecycle of one transaction signature as reported by the ledger.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TxStatus {
    /// Ledger has no record of the signature yet.
    Unknown,
    /// Processed but not yet confirmed by a supermajority.
    NotConfirmed,
    /// Confirmed by a supermajority.
    Confirmed,
    /// Rooted.
    Finalized,
    /// Ledger executed the transaction and reported an error.
    Failed(String),
}

impl TxStatus {
    /// Returns true when the status ends a confirmation attempt.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized | Self::Failed(_))
    }

    /// Returns true when the transaction has durably landed.
    #[must_use]
    pub const fn is_landed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::NotConfirmed => f.write_str("not-confirmed"),
            Self::Confirmed => f.write_str("confirmed"),
            Self::Finalized => f.write_str("finalized"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of simulating a signed transaction.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SimulationOutcome {
    /// Execution error rendered as text, when simulation failed.
    pub error: Option<String>,
    /// Program log lines in emission order.
    pub logs: Vec<String>,
}

/// Blocking-style request/response operations against ledger nodes.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetches the newest blockhash and its expiry height.
    async fn latest_block_reference(&self) -> Result<BlockReference, TransportError>;

    /// Fetches the current block height.
    async fn block_height(&self) -> Result<u64, TransportError>;

    /// Fetches the status of one signature; [`TxStatus::Unknown`] when the ledger has none.
    async fn signature_status(&self, signature: &Signature) -> Result<TxStatus, TransportError>;

    /// Submits wire-format transaction bytes and returns the ledger-reported signature.
    async fn send_raw(&self, tx_bytes: &[u8]) -> Result<Signature, TransportError>;

    /// Simulates wire-format transaction bytes.
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<SimulationOutcome, TransportError>;
}
