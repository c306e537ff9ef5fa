//! Block-engine JSON-RPC relay client.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinHandle, time::sleep};

use super::{Bundle, BundleId, BundleOutcome, BundleResult, MAX_BUNDLE_TRANSACTIONS, RelayClient};
use crate::{
    jsonrpc::{self, WithContext},
    ledger::TransportError,
};

/// Path of the bundle API on a block-engine host.
const BUNDLES_PATH: &str = "/api/v1/bundles";

/// Relay client tuning.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RelayRpcConfig {
    /// Regional block-engine endpoints, closest first.
    ///
    /// Bundles are sent to the first endpoint only; the relay forwards them to its other
    /// regions itself.
    pub endpoints: Vec<String>,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Delay between in-flight status polls.
    pub status_poll_interval: Duration,
    /// How long a bundle is tracked before it is treated as silently dropped.
    pub tracking_window: Duration,
    /// Capacity of the shared result stream.
    pub result_capacity: usize,
}

impl Default for RelayRpcConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "frankfurt.mainnet.block-engine.jito.wtf".to_owned(),
                "tokyo.mainnet.block-engine.jito.wtf".to_owned(),
                "amsterdam.mainnet.block-engine.jito.wtf".to_owned(),
            ],
            request_timeout: Duration::from_secs(10),
            status_poll_interval: Duration::from_secs(1),
            tracking_window: Duration::from_secs(120),
            result_capacity: 256,
        }
    }
}

/// State shared between the client handle and its status poller.
#[derive(Debug)]
struct RelayShared {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Bundle API URL of the primary endpoint.
    bundles_url: String,
    /// Submitted bundles without a verdict, with their send time.
    tracked: Mutex<HashMap<BundleId, Instant>>,
    /// Shared result stream.
    results: broadcast::Sender<BundleResult>,
    /// Client tuning.
    config: RelayRpcConfig,
}

/// Relay client speaking the block-engine JSON-RPC bundle API.
///
/// Verdicts are produced by [`Self::spawn_status_poller`], which polls in-flight statuses of
/// tracked bundles and publishes terminal ones on the shared result stream.
#[derive(Debug, Clone)]
pub struct JsonRpcRelayClient {
    /// Shared client state.
    shared: Arc<RelayShared>,
}

impl JsonRpcRelayClient {
    /// Creates a relay client addressing the first configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when no endpoint is configured or HTTP client
    /// creation fails.
    pub fn new(config: RelayRpcConfig) -> Result<Self, TransportError> {
        let primary = config
            .endpoints
            .first()
            .ok_or_else(|| TransportError::Config {
                message: "no relay endpoints configured".to_owned(),
            })?;
        let bundles_url = bundles_url(primary);
        let client = jsonrpc::http_client(config.request_timeout)?;
        let (results, _) = broadcast::channel(config.result_capacity.max(1));
        Ok(Self {
            shared: Arc::new(RelayShared {
                client,
                bundles_url,
                tracked: Mutex::new(HashMap::new()),
                results,
                config,
            }),
        })
    }

    /// Returns the bundle API URL bundles are sent to.
    #[must_use]
    pub fn bundles_url(&self) -> &str {
        &self.shared.bundles_url
    }

    /// Spawns the task that turns in-flight status polls into result-stream notifications.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_status_poller(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                sleep(shared.config.status_poll_interval).await;
                poll_inflight(&shared).await;
            }
        })
    }
}

/// Builds the bundle API URL for a host or base URL.
fn bundles_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}{BUNDLES_PATH}")
    } else {
        format!("https://{base}{BUNDLES_PATH}")
    }
}

/// One `getInflightBundleStatuses` entry.
#[derive(Debug, Deserialize)]
struct InflightStatus {
    /// Correlation id.
    bundle_id: String,
    /// `Invalid`, `Pending`, `Failed`, or `Landed`.
    status: String,
    /// Slot the bundle landed in.
    landed_slot: Option<u64>,
}

/// Maps an in-flight status onto a terminal verdict; `None` while undecided.
fn outcome_from_inflight(entry: &InflightStatus) -> Option<BundleOutcome> {
    match entry.status.as_str() {
        "Landed" => match entry.landed_slot {
            Some(slot) => Some(BundleOutcome::Accepted {
                slot,
                validator: None,
            }),
            None => {
                tracing::debug!(bundle_id = %entry.bundle_id, "landed bundle reported without slot");
                None
            }
        },
        "Failed" => Some(BundleOutcome::Rejected {
            reason: "bundle failed in block engine auction or simulation".to_owned(),
        }),
        _ => None,
    }
}

/// Drops tracked bundles older than `window`.
fn prune_tracked(tracked: &mut HashMap<BundleId, Instant>, window: Duration, now: Instant) {
    tracked.retain(|bundle_id, sent_at| {
        let keep = now.saturating_duration_since(*sent_at) < window;
        if !keep {
            tracing::debug!(%bundle_id, "no bundle verdict within tracking window");
        }
        keep
    });
}

/// Polls every tracked bundle once and publishes terminal verdicts.
async fn poll_inflight(shared: &RelayShared) {
    let ids: Vec<BundleId> = match shared.tracked.lock() {
        Ok(mut tracked) => {
            prune_tracked(&mut tracked, shared.config.tracking_window, Instant::now());
            tracked.keys().cloned().collect()
        }
        Err(_) => return,
    };

    for chunk in ids.chunks(MAX_BUNDLE_TRANSACTIONS) {
        let params = serde_json::json!([chunk.iter().map(BundleId::as_str).collect::<Vec<_>>()]);
        let statuses: WithContext<Vec<InflightStatus>> = match jsonrpc::call(
            &shared.client,
            &shared.bundles_url,
            "getInflightBundleStatuses",
            params,
        )
        .await
        {
            Ok(statuses) => statuses,
            Err(error) => {
                tracing::warn!(error = %error, "in-flight bundle status poll failed");
                continue;
            }
        };

        for entry in statuses.value {
            let Some(outcome) = outcome_from_inflight(&entry) else {
                continue;
            };
            let bundle_id = BundleId::from(entry.bundle_id);
            if let Ok(mut tracked) = shared.tracked.lock() {
                let _ = tracked.remove(&bundle_id);
            }
            // Err only means there are no subscribers.
            let _ = shared.results.send(BundleResult { bundle_id, outcome });
        }
    }
}

#[async_trait]
impl RelayClient for JsonRpcRelayClient {
    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleId, TransportError> {
        let encoded: Vec<String> = bundle
            .transactions()
            .iter()
            .map(|tx| BASE64_STANDARD.encode(tx.bytes()))
            .collect();
        let bundle_id: String = jsonrpc::call(
            &self.shared.client,
            &self.shared.bundles_url,
            "sendBundle",
            serde_json::json!([encoded, { "encoding": "base64" }]),
        )
        .await?;
        let bundle_id = BundleId::from(bundle_id);
        if let Ok(mut tracked) = self.shared.tracked.lock() {
            let now = Instant::now();
            prune_tracked(&mut tracked, self.shared.config.tracking_window, now);
            let _ = tracked.insert(bundle_id.clone(), now);
        }
        Ok(bundle_id)
    }

    fn subscribe_results(&self) -> broadcast::Receiver<BundleResult> {
        self.shared.results.subscribe()
    }
}
