//! Confirmation tuning, observer hooks, and error taxonomy.

use std::time::Duration;

use solana_signature::Signature;
use thiserror::Error;

use crate::ledger::TxStatus;

/// Confirmation loop tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ConfirmConfig {
    /// Delay between identical-payload rebroadcasts.
    pub rebroadcast_interval: Duration,
    /// Delay between signature status polls.
    pub poll_interval: Duration,
    /// Delay between re-signed submissions in block-height bounded mode.
    pub resubmit_interval: Duration,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            rebroadcast_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            resubmit_interval: Duration::from_millis(500),
        }
    }
}

impl ConfirmConfig {
    /// Returns this config with intervals bounded below by one millisecond.
    #[must_use]
    pub fn normalized(self) -> Self {
        let floor = Duration::from_millis(1);
        Self {
            rebroadcast_interval: self.rebroadcast_interval.max(floor),
            poll_interval: self.poll_interval.max(floor),
            resubmit_interval: self.resubmit_interval.max(floor),
        }
    }
}

/// Side-effect hooks invoked while one transaction is being confirmed.
///
/// Every hook defaults to a no-op. Hooks run inline on the confirming task, so they should
/// return quickly.
pub trait ConfirmationObserver: Send + Sync {
    /// Called once, the first time the payload is accepted by a node.
    fn on_sent(&self, _signature: &Signature) {}

    /// Called after every successful status poll, in poll order.
    fn on_status_change(&self, _signature: &Signature, _status: &TxStatus) {}

    /// Called once after the transaction reached `confirmed` or `finalized`.
    fn on_success(&self, _signature: &Signature) {}
}

/// Observer that ignores every hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConfirmationObserver for NoopObserver {}

/// Terminal failures of a confirmation attempt.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfirmationError {
    /// Ledger reported an explicit error for the signature.
    #[error("transaction {signature} rejected by ledger: {reason}")]
    Rejected {
        /// Rejected transaction.
        signature: Signature,
        /// Ledger error detail.
        reason: String,
    },
    /// Deadline elapsed and simulation explained why the program fails.
    #[error("transaction {signature} failed: {message}")]
    ProgramFailure {
        /// Failed transaction.
        signature: Signature,
        /// Last program log line, or the simulation error when no log was emitted.
        message: String,
    },
    /// Deadline elapsed without a terminal status or a simulation diagnosis.
    #[error("timed out awaiting confirmation on transaction {signature}")]
    TimedOut {
        /// Transaction that never reached a terminal status.
        signature: Signature,
    },
    /// Block height passed the expiry of the submission's block reference.
    #[error("block height exceeded {last_valid_block_height} before the transaction landed")]
    Expired {
        /// Last submitted signature, if any submission happened.
        signature: Option<Signature>,
        /// Expiry height that was exceeded.
        last_valid_block_height: u64,
    },
    /// No block reference could be fetched before the deadline.
    #[error("no block reference available before deadline: {message}")]
    Unavailable {
        /// Last transport error observed.
        message: String,
    },
    /// Caller-supplied re-signing failed.
    #[error("failed to re-sign transaction: {message}")]
    Resign {
        /// Re-signing error rendered as text.
        message: String,
    },
}

impl ConfirmationError {
    /// Returns the human-readable failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected { reason, .. } => reason,
            Self::ProgramFailure { message, .. }
            | Self::Unavailable { message }
            | Self::Resign { message } => message,
            Self::TimedOut { .. } => "timed out awaiting confirmation",
            Self::Expired { .. } => "block height exceeded",
        }
    }

    /// Returns the signature the failure refers to, when one was submitted.
    #[must_use]
    pub const fn signature(&self) -> Option<Signature> {
        match self {
            Self::Rejected { signature, .. }
            | Self::ProgramFailure { signature, .. }
            | Self::TimedOut { signature } => Some(*signature),
            Self::Expired { signature, .. } => *signature,
            Self::Unavailable { .. } | Self::Resign { .. } => None,
        }
    }
}

/// Failures of [`crate::ConfirmationEngine::wait_for_new_blocks`].
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum BlockWaitError {
    /// Deadline elapsed before the block reference advanced far enough.
    #[error("timed out waiting for block reference expiry above {target_height}")]
    TimedOut {
        /// Expiry height that had to be exceeded; zero when no baseline was fetched.
        target_height: u64,
    },
}
