//! Rebroadcast-until-terminal confirmation engine.

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use solana_signature::Signature;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::{
    BlockWaitError, ConfirmConfig, ConfirmationError, ConfirmationObserver, NoopObserver,
    diagnose::diagnose,
};
use crate::{
    ledger::{BlockReference, LedgerClient, TxStatus},
    signed::SignedTransaction,
};

/// Upper bound applied to caller timeouts so deadlines never overflow the clock.
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Terminal result of the status poll loop.
#[derive(Debug)]
enum PollOutcome {
    /// Reached `confirmed` or `finalized`.
    Landed(TxStatus),
    /// Ledger reported an explicit error.
    Rejected(String),
    /// Deadline elapsed first.
    TimedOut,
}

/// Drives signed transactions to a terminal outcome against one ledger client.
///
/// Concurrent calls are independent; the engine holds no per-transaction state.
pub struct ConfirmationEngine {
    /// Ledger network client.
    ledger: Arc<dyn LedgerClient>,
    /// Loop tuning.
    config: ConfirmConfig,
}

impl ConfirmationEngine {
    /// Creates an engine with default one-second loop intervals.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            config: ConfirmConfig::default(),
        }
    }

    /// Sets loop tuning.
    #[must_use]
    pub fn with_config(mut self, config: ConfirmConfig) -> Self {
        self.config = config.normalized();
        self
    }

    /// Returns the active loop tuning.
    #[must_use]
    pub const fn config(&self) -> &ConfirmConfig {
        &self.config
    }

    /// Confirms one transaction without observer hooks.
    ///
    /// # Errors
    ///
    /// See [`Self::confirm_with_observer`].
    pub async fn confirm(
        &self,
        tx: &SignedTransaction,
        timeout: Duration,
    ) -> Result<Signature, ConfirmationError> {
        self.confirm_with_observer(tx, timeout, &NoopObserver).await
    }

    /// Sends `tx` once, then rebroadcasts it and polls its status until it lands, fails, or
    /// `timeout` elapses.
    ///
    /// Transport errors on individual sends and polls are logged and retried on the next tick.
    /// The deadline is cooperative: a slow in-flight call can overrun it by one call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Rejected`] when the ledger reports an error for the
    /// signature, [`ConfirmationError::ProgramFailure`] when the deadline elapsed and a
    /// simulation explains the failure, and [`ConfirmationError::TimedOut`] otherwise.
    pub async fn confirm_with_observer(
        &self,
        tx: &SignedTransaction,
        timeout: Duration,
        observer: &dyn ConfirmationObserver,
    ) -> Result<Signature, ConfirmationError> {
        let signature = tx.signature();
        let started = Instant::now();
        let deadline = deadline_from(started, timeout);

        let announced = AtomicBool::new(false);
        match self.ledger.send_raw(tx.bytes()).await {
            Ok(_) => {
                announced.store(true, Ordering::Release);
                observer.on_sent(&signature);
            }
            Err(error) => {
                tracing::warn!(%signature, error = %error, "initial send failed; relying on rebroadcast");
            }
        }
        tracing::debug!(%signature, ?timeout, "awaiting confirmation");

        let cancel = CancellationToken::new();
        let (rebroadcasts, outcome) = tokio::join!(
            self.rebroadcast_loop(tx, deadline, &cancel, &announced, observer),
            async {
                let outcome = self.poll_loop(signature, deadline, observer).await;
                cancel.cancel();
                outcome
            }
        );

        match outcome {
            PollOutcome::Landed(status) => {
                tracing::info!(
                    %signature,
                    %status,
                    rebroadcasts,
                    latency_ms = started.elapsed().as_millis(),
                    "transaction landed"
                );
                observer.on_success(&signature);
                Ok(signature)
            }
            PollOutcome::Rejected(reason) => {
                tracing::warn!(%signature, %reason, rebroadcasts, "transaction rejected by ledger");
                Err(ConfirmationError::Rejected { signature, reason })
            }
            PollOutcome::TimedOut => {
                let error = self.diagnose_timeout(tx).await;
                tracing::warn!(%signature, rebroadcasts, error = %error, "confirmation timed out");
                Err(error)
            }
        }
    }

    /// Resends the identical payload every interval until cancelled; returns resend count.
    async fn rebroadcast_loop(
        &self,
        tx: &SignedTransaction,
        deadline: Instant,
        cancel: &CancellationToken,
        announced: &AtomicBool,
        observer: &dyn ConfirmationObserver,
    ) -> u64 {
        let signature = tx.signature();
        let mut rebroadcasts = 0_u64;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sleep(self.config.rebroadcast_interval) => {}
            }
            if cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }
            match self.ledger.send_raw(tx.bytes()).await {
                Ok(_) => {
                    rebroadcasts = rebroadcasts.saturating_add(1);
                    if !announced.swap(true, Ordering::AcqRel) {
                        observer.on_sent(&signature);
                    }
                }
                Err(error) => {
                    tracing::debug!(%signature, error = %error, "rebroadcast failed");
                }
            }
        }
        rebroadcasts
    }

    /// Polls the signature status until a terminal status or the deadline.
    async fn poll_loop(
        &self,
        signature: Signature,
        deadline: Instant,
        observer: &dyn ConfirmationObserver,
    ) -> PollOutcome {
        loop {
            match self.ledger.signature_status(&signature).await {
                Ok(status) => {
                    observer.on_status_change(&signature, &status);
                    match status {
                        TxStatus::Failed(reason) => return PollOutcome::Rejected(reason),
                        TxStatus::Confirmed | TxStatus::Finalized => {
                            return PollOutcome::Landed(status);
                        }
                        TxStatus::Unknown | TxStatus::NotConfirmed => {
                            tracing::trace!(%signature, %status, "transaction not confirmed yet");
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%signature, error = %error, "signature status poll failed");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PollOutcome::TimedOut;
            }
            sleep(self.config.poll_interval.min(remaining)).await;
            if Instant::now() >= deadline {
                return PollOutcome::TimedOut;
            }
        }
    }

    /// Simulates a timed-out transaction once to tell logic failures from non-delivery.
    async fn diagnose_timeout(&self, tx: &SignedTransaction) -> ConfirmationError {
        let signature = tx.signature();
        match self.ledger.simulate(tx.bytes()).await {
            Ok(simulation) => diagnose(signature, &simulation),
            Err(error) => {
                tracing::debug!(%signature, error = %error, "timeout diagnosis simulation failed");
                ConfirmationError::TimedOut { signature }
            }
        }
    }

    /// Re-signs and resubmits against fresh block references until one submission lands or
    /// block height passes the expiry of the first reference.
    ///
    /// `resign` receives every fresh [`BlockReference`] and returns the transaction signed
    /// against it; signing stays with the caller. Every signature submitted so far is checked
    /// before each resubmission, so an earlier submission that lands ends the loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Rejected`] when a submission fails on-ledger,
    /// [`ConfirmationError::Expired`] when block height passes the expiry,
    /// [`ConfirmationError::Resign`] when `resign` fails, and
    /// [`ConfirmationError::TimedOut`]/[`ConfirmationError::Unavailable`] when `timeout`
    /// elapses first.
    pub async fn resubmit_until_expired<F, E>(
        &self,
        resign: F,
        timeout: Duration,
    ) -> Result<Signature, ConfirmationError>
    where
        F: Fn(&BlockReference) -> Result<SignedTransaction, E> + Send + Sync,
        E: Display,
    {
        let deadline = deadline_from(Instant::now(), timeout);
        let mut submitted: Vec<Signature> = Vec::new();
        let mut expiry: Option<u64> = None;
        let mut last_error = String::from("no attempt made");

        loop {
            for signature in &submitted {
                match self.ledger.signature_status(signature).await {
                    Ok(status) if status.is_landed() => {
                        tracing::info!(%signature, %status, attempts = submitted.len(), "resubmitted transaction landed");
                        return Ok(*signature);
                    }
                    Ok(TxStatus::Failed(reason)) => {
                        return Err(ConfirmationError::Rejected {
                            signature: *signature,
                            reason,
                        });
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(%signature, error = %error, "signature status poll failed");
                    }
                }
            }

            if let Some(last_valid_block_height) = expiry {
                match self.ledger.block_height().await {
                    Ok(height) if height > last_valid_block_height => {
                        return Err(ConfirmationError::Expired {
                            signature: submitted.last().copied(),
                            last_valid_block_height,
                        });
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(error = %error, "block height query failed");
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(match submitted.last() {
                    Some(signature) => ConfirmationError::TimedOut {
                        signature: *signature,
                    },
                    None => ConfirmationError::Unavailable {
                        message: last_error,
                    },
                });
            }

            match self.ledger.latest_block_reference().await {
                Ok(reference) => {
                    if expiry.is_none() {
                        self.ensure_not_expired(reference.last_valid_block_height).await?;
                    }
                    let first_expiry = *expiry.get_or_insert(reference.last_valid_block_height);
                    let tx = resign(&reference).map_err(|error| ConfirmationError::Resign {
                        message: error.to_string(),
                    })?;
                    let signature = tx.signature();
                    if let Err(error) = self.ledger.send_raw(tx.bytes()).await {
                        tracing::warn!(%signature, error = %error, "resubmission send failed");
                    }
                    if !submitted.contains(&signature) {
                        submitted.push(signature);
                    }
                    tracing::debug!(
                        %signature,
                        blockhash = %reference.blockhash,
                        last_valid_block_height = first_expiry,
                        "resubmitted transaction"
                    );
                }
                Err(error) => {
                    tracing::warn!(error = %error, "block reference fetch failed");
                    last_error = error.to_string();
                }
            }

            sleep(self.config.resubmit_interval).await;
        }
    }

    /// Fails with [`ConfirmationError::Expired`] when block height is already past
    /// `last_valid_block_height`; a failed height query is logged and tolerated.
    async fn ensure_not_expired(
        &self,
        last_valid_block_height: u64,
    ) -> Result<(), ConfirmationError> {
        match self.ledger.block_height().await {
            Ok(height) if height > last_valid_block_height => Err(ConfirmationError::Expired {
                signature: None,
                last_valid_block_height,
            }),
            Ok(_) => Ok(()),
            Err(error) => {
                tracing::warn!(error = %error, "block height query failed");
                Ok(())
            }
        }
    }

    /// Waits until the ledger's block reference expiry advances by more than `blocks`.
    ///
    /// Returns the expiry height that was observed above the target.
    ///
    /// # Errors
    ///
    /// Returns [`BlockWaitError::TimedOut`] when `timeout` elapses first.
    pub async fn wait_for_new_blocks(
        &self,
        blocks: u64,
        timeout: Duration,
    ) -> Result<u64, BlockWaitError> {
        let deadline = deadline_from(Instant::now(), timeout);
        let mut target: Option<u64> = None;
        tracing::debug!(blocks, "waiting for new blocks");

        loop {
            match self.ledger.latest_block_reference().await {
                Ok(reference) => match target {
                    None => target = Some(reference.last_valid_block_height.saturating_add(blocks)),
                    Some(target_height) if reference.last_valid_block_height > target_height => {
                        return Ok(reference.last_valid_block_height);
                    }
                    Some(_) => {}
                },
                Err(error) => {
                    tracing::warn!(error = %error, "block reference fetch failed");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BlockWaitError::TimedOut {
                    target_height: target.unwrap_or_default(),
                });
            }
            sleep(self.config.poll_interval.min(remaining)).await;
        }
    }
}

/// Computes a deadline, clamping absurd timeouts.
fn deadline_from(start: Instant, timeout: Duration) -> Instant {
    start.checked_add(timeout.min(MAX_TIMEOUT)).unwrap_or(start)
}
