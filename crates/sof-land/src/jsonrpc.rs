//! Minimal JSON-RPC 2.0 over HTTP shared by the ledger and relay clients.

use std::time::Duration;

use serde::{Deserialize, de::DeserializeOwned};

use crate::ledger::TransportError;

/// Builds the HTTP client used by JSON-RPC transports.
pub(crate) fn http_client(request_timeout: Duration) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|error| TransportError::Config {
            message: error.to_string(),
        })
}

/// Posts one JSON-RPC request to `url` and decodes its `result`.
pub(crate) async fn call<T>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response = client
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(|error| TransportError::Failure {
            message: error.to_string(),
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| TransportError::Failure {
            message: error.to_string(),
        })?;
    decode(method, status, &body)
}

/// Decodes a response body, keeping JSON-RPC error text even on non-success HTTP statuses.
fn decode<T>(method: &str, status: reqwest::StatusCode, body: &str) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    match serde_json::from_str::<JsonRpcResponse<T>>(body) {
        Ok(parsed) => parsed.into_result(method),
        Err(error) if status.is_success() => Err(TransportError::Failure {
            message: format!("{method} returned an undecodable response: {error}"),
        }),
        Err(_) => Err(TransportError::Failure {
            message: format!("{method} failed with http status {status}: {body}"),
        }),
    }
}

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse<T> {
    /// Result value for successful calls.
    result: Option<T>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

impl<T> JsonRpcResponse<T> {
    /// Converts the envelope into the call result.
    pub(crate) fn into_result(self, method: &str) -> Result<T, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Failure {
                message: format!("{method} rpc error {}: {}", error.code, error.message),
            });
        }
        self.result.ok_or_else(|| TransportError::Failure {
            message: format!("{method} returned neither result nor error"),
        })
    }
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    /// JSON-RPC error code.
    code: i64,
    /// Human-readable message.
    message: String,
}

/// Context-tagged response value.
#[derive(Debug, Deserialize)]
pub(crate) struct WithContext<T> {
    /// Wrapped value.
    pub(crate) value: T,
}
