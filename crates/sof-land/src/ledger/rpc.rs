//! JSON-RPC ledger client implementation.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use solana_hash::Hash;
use solana_signature::Signature;

use super::{BlockReference, LedgerClient, SimulationOutcome, TransportError, TxStatus};
use crate::jsonrpc::{self, WithContext};

/// JSON-RPC ledger tuning.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LedgerRpcConfig {
    /// Skip preflight simulation on `sendTransaction` when true.
    pub skip_preflight: bool,
    /// Commitment used for blockhash, block height, and simulation queries.
    pub commitment: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for LedgerRpcConfig {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            commitment: "confirmed".to_owned(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Ledger client speaking Solana JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcLedgerClient {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    rpc_url: String,
    /// Request tuning.
    config: LedgerRpcConfig,
}

impl JsonRpcLedgerClient {
    /// Creates a JSON-RPC ledger client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when HTTP client creation fails.
    pub fn new(
        rpc_url: impl Into<String>,
        config: LedgerRpcConfig,
    ) -> Result<Self, TransportError> {
        let client = jsonrpc::http_client(config.request_timeout)?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            config,
        })
    }

    /// Posts one JSON-RPC request to the configured endpoint.
    async fn call<T>(&self, method: &str, params: serde_json::Value) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        jsonrpc::call(&self.client, &self.rpc_url, method, params).await
    }
}

/// `getLatestBlockhash` value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    /// Base58 blockhash.
    blockhash: String,
    /// Expiry height.
    last_valid_block_height: u64,
}

/// One `getSignatureStatuses` entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    /// Confirmation count; `None` once rooted.
    confirmations: Option<u64>,
    /// Execution error, if any.
    err: Option<serde_json::Value>,
    /// Commitment reached so far.
    confirmation_status: Option<String>,
}

/// `simulateTransaction` value.
#[derive(Debug, Deserialize)]
struct RpcSimulation {
    /// Execution error, if any.
    err: Option<serde_json::Value>,
    /// Program logs.
    logs: Option<Vec<String>>,
}

/// Maps one optional signature status entry into [`TxStatus`].
fn status_from_rpc(entry: Option<RpcSignatureStatus>) -> TxStatus {
    let Some(entry) = entry else {
        return TxStatus::Unknown;
    };
    if let Some(err) = entry.err {
        return TxStatus::Failed(err.to_string());
    }
    match entry.confirmation_status.as_deref() {
        Some("finalized") => TxStatus::Finalized,
        Some("confirmed") => TxStatus::Confirmed,
        _ if entry.confirmations.is_some_and(|count| count > 0) => TxStatus::Confirmed,
        _ => TxStatus::NotConfirmed,
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn latest_block_reference(&self) -> Result<BlockReference, TransportError> {
        let response: WithContext<RpcBlockhash> = self
            .call(
                "getLatestBlockhash",
                serde_json::json!([{ "commitment": self.config.commitment }]),
            )
            .await?;
        let blockhash =
            Hash::from_str(&response.value.blockhash).map_err(|error| TransportError::Failure {
                message: format!("invalid blockhash `{}`: {error}", response.value.blockhash),
            })?;
        Ok(BlockReference {
            blockhash,
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, TransportError> {
        self.call(
            "getBlockHeight",
            serde_json::json!([{ "commitment": self.config.commitment }]),
        )
        .await
    }

    async fn signature_status(&self, signature: &Signature) -> Result<TxStatus, TransportError> {
        let response: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature.to_string()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(status_from_rpc(response.value.into_iter().next().flatten()))
    }

    async fn send_raw(&self, tx_bytes: &[u8]) -> Result<Signature, TransportError> {
        #[derive(Debug, Serialize)]
        struct SendConfig {
            /// Transaction encoding format.
            encoding: &'static str,
            /// Preflight skip flag.
            #[serde(rename = "skipPreflight")]
            skip_preflight: bool,
            /// Retries left to the node; rebroadcast is handled by the caller.
            #[serde(rename = "maxRetries")]
            max_retries: u8,
        }

        let signature: String = self
            .call(
                "sendTransaction",
                serde_json::json!([
                    BASE64_STANDARD.encode(tx_bytes),
                    SendConfig {
                        encoding: "base64",
                        skip_preflight: self.config.skip_preflight,
                        max_retries: 0,
                    }
                ]),
            )
            .await?;
        Signature::from_str(&signature).map_err(|error| TransportError::Failure {
            message: format!("invalid signature `{signature}`: {error}"),
        })
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<SimulationOutcome, TransportError> {
        let response: WithContext<RpcSimulation> = self
            .call(
                "simulateTransaction",
                serde_json::json!([
                    BASE64_STANDARD.encode(tx_bytes),
                    {
                        "encoding": "base64",
                        "commitment": self.config.commitment,
                        "sigVerify": false,
                    }
                ]),
            )
            .await?;
        Ok(SimulationOutcome {
            error: response.value.err.map(|err| err.to_string()),
            logs: response.value.logs.unwrap_or_default(),
        })
    }
}
