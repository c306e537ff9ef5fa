//! Bundle dispatch and relay result correlation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tokio::{
    sync::{broadcast, oneshot},
    task::{self, JoinHandle},
};

use super::{
    Bundle, BundleId, BundleOutcome, BundleResult, BundleWait, DispatchError, NO_LEADER_MESSAGE,
    RelayClient, cache::RecentResults,
};
use crate::ledger::TransportError;

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DispatchConfig {
    /// How long a result for an unregistered id stays claimable.
    pub recent_result_ttl: Duration,
    /// Maximum number of unmatched results kept for late registration.
    pub recent_result_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            recent_result_ttl: Duration::from_secs(30),
            recent_result_capacity: 1_024,
        }
    }
}

/// Correlation table shared between dispatch calls and the result pump.
#[derive(Debug)]
struct DispatchState {
    /// Waiters by correlation id.
    pending: HashMap<BundleId, Vec<oneshot::Sender<BundleOutcome>>>,
    /// Results that arrived for ids nobody had registered yet, while a send was in flight.
    recent: RecentResults,
    /// Number of `send_bundle` calls awaiting the relay's id.
    sends_in_flight: usize,
    /// Set once the dispatcher shut down or the result stream closed.
    stopped: bool,
}

impl DispatchState {
    /// Drops every pending waiter; their receivers observe abandonment.
    fn stop(&mut self) {
        self.stopped = true;
        self.pending.clear();
    }
}

/// Handle to one dispatched bundle awaiting its relay verdict.
#[derive(Debug)]
pub struct PendingBundle {
    /// Relay-assigned correlation id.
    bundle_id: BundleId,
    /// Delivers the verdict at most once.
    receiver: oneshot::Receiver<BundleOutcome>,
}

impl PendingBundle {
    /// Returns the relay-assigned correlation id.
    #[must_use]
    pub const fn bundle_id(&self) -> &BundleId {
        &self.bundle_id
    }

    /// Waits for the verdict; `None` when the dispatcher stopped before one arrived.
    ///
    /// The relay may silently drop a bundle, in which case this never resolves on its own.
    /// Use [`Self::wait_timeout`] unless the caller already bounds the wait.
    pub async fn wait(self) -> Option<BundleOutcome> {
        self.receiver.await.ok()
    }

    /// Waits for the verdict up to `timeout`.
    pub async fn wait_timeout(self, timeout: Duration) -> BundleWait {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(outcome)) => BundleWait::Resolved(outcome),
            Ok(Err(_)) | Err(_) => BundleWait::Inconclusive,
        }
    }
}

/// Sends bundles to a relay and routes the relay's shared result stream back to each sender.
///
/// One result-stream subscription is held per dispatcher; the pump task is aborted when the
/// dispatcher is shut down or dropped.
pub struct BundleDispatcher {
    /// Relay client.
    relay: Arc<dyn RelayClient>,
    /// Shared correlation table.
    state: Arc<Mutex<DispatchState>>,
    /// Result pump task.
    pump: JoinHandle<()>,
}

impl BundleDispatcher {
    /// Subscribes to the relay's result stream and spawns the result pump with default tuning.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(relay: Arc<dyn RelayClient>) -> Self {
        Self::spawn_with_config(relay, DispatchConfig::default())
    }

    /// Subscribes to the relay's result stream and spawns the result pump.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_with_config(relay: Arc<dyn RelayClient>, config: DispatchConfig) -> Self {
        let state = Arc::new(Mutex::new(DispatchState {
            pending: HashMap::new(),
            recent: RecentResults::new(config.recent_result_ttl, config.recent_result_capacity),
            sends_in_flight: 0,
            stopped: false,
        }));
        let results = relay.subscribe_results();
        let pump = task::spawn(pump_results(results, Arc::clone(&state)));
        Self { relay, state, pump }
    }

    /// Sends `bundle` and registers for its verdict.
    ///
    /// Send failures are classified and returned without retry so the caller's pipeline can
    /// continue with subsequent bundles.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoLeaderAvailable`] for the relay's expected no-leader
    /// condition, [`DispatchError::Relay`] for other send failures, and
    /// [`DispatchError::Stopped`] after shutdown.
    pub async fn dispatch(&self, bundle: &Bundle) -> Result<PendingBundle, DispatchError> {
        let started = Instant::now();
        let in_flight = InFlightSend::begin(&self.state)?;
        let sent = self.relay.send_bundle(bundle).await;
        drop(in_flight);
        let bundle_id = sent.map_err(|error| classify_send_error(&error))?;
        tracing::info!(%bundle_id, transactions = bundle.len(), "bundle sent");

        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.lock_state()?;
            if state.stopped {
                return Err(DispatchError::Stopped);
            }
            state.pending.retain(|_, waiters| {
                waiters.retain(|waiter| !waiter.is_closed());
                !waiters.is_empty()
            });
            if let Some(outcome) = state.recent.take(&bundle_id, started, Instant::now()) {
                tracing::debug!(%bundle_id, %outcome, "bundle result arrived before registration");
                let _ = sender.send(outcome);
            } else {
                state
                    .pending
                    .entry(bundle_id.clone())
                    .or_default()
                    .push(sender);
            }
        }

        Ok(PendingBundle {
            bundle_id,
            receiver,
        })
    }

    /// Returns number of correlation ids still awaiting a verdict.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.pending.len())
            .unwrap_or_default()
    }

    /// Stops the result pump and abandons every pending dispatch.
    pub fn shutdown(&self) {
        self.pump.abort();
        match self.state.lock() {
            Ok(mut state) => state.stop(),
            Err(poisoned) => poisoned.into_inner().stop(),
        }
        tracing::debug!("bundle dispatcher stopped");
    }

    /// Locks the correlation table.
    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, DispatchState>, DispatchError> {
        self.state
            .lock()
            .map_err(|poisoned| DispatchError::InternalSync {
                message: poisoned.to_string(),
            })
    }
}

impl Drop for BundleDispatcher {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Marks one relay send as in flight until dropped.
struct InFlightSend<'a> {
    /// Correlation table holding the in-flight counter.
    state: &'a Mutex<DispatchState>,
}

impl<'a> InFlightSend<'a> {
    /// Registers a send, failing when the dispatcher already stopped.
    fn begin(state: &'a Mutex<DispatchState>) -> Result<Self, DispatchError> {
        let mut guard = state.lock().map_err(|poisoned| DispatchError::InternalSync {
            message: poisoned.to_string(),
        })?;
        if guard.stopped {
            return Err(DispatchError::Stopped);
        }
        guard.sends_in_flight = guard.sends_in_flight.saturating_add(1);
        Ok(Self { state })
    }
}

impl Drop for InFlightSend<'_> {
    fn drop(&mut self) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.sends_in_flight = guard.sends_in_flight.saturating_sub(1);
    }
}

/// Maps a relay send failure onto the dispatch error taxonomy.
fn classify_send_error(error: &TransportError) -> DispatchError {
    let message = error.message().to_owned();
    if message.contains(NO_LEADER_MESSAGE) {
        tracing::info!("bundle dropped by relay: no connected leader up soon");
        DispatchError::NoLeaderAvailable { message }
    } else {
        tracing::warn!(error = %error, "bundle send failed");
        DispatchError::Relay { message }
    }
}

/// Consumes the relay result stream until it closes.
async fn pump_results(
    mut results: broadcast::Receiver<BundleResult>,
    state: Arc<Mutex<DispatchState>>,
) {
    loop {
        match results.recv().await {
            Ok(result) => route_result(&state, result),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "bundle result stream lagged; dropping stale results");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("bundle result stream closed; abandoning pending dispatches");
                if let Ok(mut state) = state.lock() {
                    state.stop();
                }
                return;
            }
        }
    }
}

/// Delivers one result to its waiters.
///
/// A result for an unregistered id is parked only while some send is still awaiting its id;
/// otherwise it belongs to an earlier or foreign submission and is dropped.
fn route_result(state: &Mutex<DispatchState>, result: BundleResult) {
    let Ok(mut state) = state.lock() else {
        tracing::error!(bundle_id = %result.bundle_id, "bundle correlation table poisoned");
        return;
    };
    let BundleResult { bundle_id, outcome } = result;
    match state.pending.remove(&bundle_id) {
        Some(waiters) => {
            tracing::info!(%bundle_id, %outcome, "bundle result received");
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
        None if state.sends_in_flight > 0 => {
            tracing::trace!(%bundle_id, "parking result for possibly in-flight bundle");
            state.recent.insert(bundle_id, outcome, Instant::now());
        }
        None => {
            tracing::trace!(%bundle_id, "ignoring result for untracked bundle");
        }
    }
}
