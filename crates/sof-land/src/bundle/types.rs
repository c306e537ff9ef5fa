//! Bundle payloads, relay results, errors, and the relay client trait.

use std::fmt;

use async_trait::async_trait;
use solana_signature::Signature;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{ledger::TransportError, signed::SignedTransaction};

/// Maximum number of transactions a relay accepts in one bundle.
pub const MAX_BUNDLE_TRANSACTIONS: usize = 5;

/// Relay error text for the expected "no leader scheduled soon" condition.
pub const NO_LEADER_MESSAGE: &str = "Bundle Dropped, no connected leader up soon";

/// Errors returned while assembling a bundle.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum BundleError {
    /// Bundle had no transactions.
    #[error("bundle contains no transactions")]
    Empty,
    /// Bundle exceeded the relay's size limit.
    #[error("bundle contains {len} transactions; at most {max} allowed")]
    TooLarge {
        /// Number of transactions supplied.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
}

/// Ordered group of signed transactions that land together or not at all.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Bundle {
    /// Transactions in execution order.
    transactions: Vec<SignedTransaction>,
}

impl Bundle {
    /// Creates a bundle from one to [`MAX_BUNDLE_TRANSACTIONS`] signed transactions.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError`] when the group is empty or too large.
    pub fn new(transactions: Vec<SignedTransaction>) -> Result<Self, BundleError> {
        if transactions.is_empty() {
            return Err(BundleError::Empty);
        }
        if transactions.len() > MAX_BUNDLE_TRANSACTIONS {
            return Err(BundleError::TooLarge {
                len: transactions.len(),
                max: MAX_BUNDLE_TRANSACTIONS,
            });
        }
        Ok(Self { transactions })
    }

    /// Returns the transactions in execution order.
    #[must_use]
    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    /// Returns the identifying signature of every transaction, in order.
    #[must_use]
    pub fn signatures(&self) -> Vec<Signature> {
        self.transactions
            .iter()
            .map(SignedTransaction::signature)
            .collect()
    }

    /// Returns number of transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Always false; bundles are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Relay-assigned correlation identifier.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct BundleId(String);

impl BundleId {
    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BundleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BundleId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal relay verdict for one bundle.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BundleOutcome {
    /// A leader accepted the bundle.
    Accepted {
        /// Slot the bundle was accepted in.
        slot: u64,
        /// Identity of the accepting validator, when reported.
        validator: Option<String>,
    },
    /// Relay rejected the bundle.
    Rejected {
        /// Relay-reported reason.
        reason: String,
    },
}

impl fmt::Display for BundleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted {
                slot,
                validator: Some(validator),
            } => write!(f, "accepted in slot {slot} by {validator}"),
            Self::Accepted {
                slot,
                validator: None,
            } => write!(f, "accepted in slot {slot}"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}

/// One notification from the relay's shared result stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BundleResult {
    /// Correlation id the result belongs to.
    pub bundle_id: BundleId,
    /// Terminal verdict.
    pub outcome: BundleOutcome,
}

/// Terminal failures of a dispatch call.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DispatchError {
    /// Relay had no leader to forward to; expected and transient, not retried here.
    #[error("bundle dropped: no connected leader up soon ({message})")]
    NoLeaderAvailable {
        /// Relay error text.
        message: String,
    },
    /// Relay rejected the send for any other reason.
    #[error("relay send failed: {message}")]
    Relay {
        /// Relay error text.
        message: String,
    },
    /// Dispatcher was shut down or its result stream closed.
    #[error("bundle dispatcher is stopped")]
    Stopped,
    /// Internal synchronization failure.
    #[error("internal synchronization failure: {message}")]
    InternalSync {
        /// Synchronization error details.
        message: String,
    },
}

/// Outcome of waiting on a dispatched bundle with a caller deadline.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BundleWait {
    /// Relay reported a verdict.
    Resolved(BundleOutcome),
    /// No verdict arrived; the caller must check ledger state for the bundle's transactions.
    Inconclusive,
}

/// Relay accepting bundles and streaming correlated results.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Sends a bundle to the primary endpoint and returns its correlation id.
    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleId, TransportError>;

    /// Subscribes to the process-wide result stream.
    fn subscribe_results(&self) -> broadcast::Receiver<BundleResult>;
}
