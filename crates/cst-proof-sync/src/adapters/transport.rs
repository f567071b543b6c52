//! JSON-RPC Transport
//!
//! One POST per call, JSON-RPC 2.0 envelope, retried with exponential
//! backoff while the failure is transient.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use tryhard::{backoff_strategies::BackoffStrategy, RetryPolicy};

use crate::config::RetryConfig;
use crate::domain::ProofSyncError;

/// Request id sent with every call. Services echo it back; we never
/// multiplex, so it is constant.
pub const REQUEST_ID: &str = "compression-example";

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// HTTP JSON-RPC client shared by the index and ledger adapters.
#[derive(Clone, Debug)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
}

impl JsonRpcTransport {
    /// Transport posting to `url`, each attempt bounded by `timeout_ms`.
    pub fn new(
        url: impl Into<String>,
        timeout_ms: u64,
        retry: RetryConfig,
    ) -> Result<Self, ProofSyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ProofSyncError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            retry,
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its `result` as `R`.
    ///
    /// Only [`ProofSyncError::UpstreamUnavailable`] is retried; RPC error
    /// objects and undecodable bodies are returned after one attempt.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, ProofSyncError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": REQUEST_ID,
            "method": method,
            "params": params,
        });

        let retry_config = tryhard::RetryFutureConfig::new(self.retry.max_retries)
            .custom_backoff(UpstreamRetryStrategy::new(Duration::from_millis(
                self.retry.initial_backoff_ms,
            )))
            .max_delay(Duration::from_millis(self.retry.max_backoff_ms))
            .on_retry(
                |attempt: u32, next_delay: Option<Duration>, error: &ProofSyncError| {
                    warn!(
                        method,
                        attempt,
                        delay_ms = next_delay.map(|d| d.as_millis() as u64),
                        error = %error,
                        "[cst] RPC call failed; retrying after delay"
                    );
                    futures::future::ready(())
                },
            );

        let this = self;
        let body = &body;
        let result = tryhard::retry_fn(move || this.send_once(body))
            .with_config(retry_config)
            .await?;

        serde_json::from_value(result)
            .map_err(|e| ProofSyncError::Decode(format!("{method}: {e}")))
    }

    async fn send_once(&self, body: &Value) -> Result<Value, ProofSyncError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| ProofSyncError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ProofSyncError::UpstreamUnavailable(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProofSyncError::UpstreamUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(ProofSyncError::Rpc {
                code: i64::from(status.as_u16()),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let envelope: RpcEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| ProofSyncError::Decode(e.to_string()))?;

        if let Some(error) = envelope.error {
            debug!(code = error.code, message = %error.message, "[cst] RPC error object");
            return Err(ProofSyncError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| ProofSyncError::Decode("response has neither result nor error".into()))
    }
}

/// Doubling backoff that gives up at once on non-transient errors.
struct UpstreamRetryStrategy {
    delay: Duration,
}

impl UpstreamRetryStrategy {
    fn new(initial: Duration) -> Self {
        Self { delay: initial }
    }
}

impl<'a> BackoffStrategy<'a, ProofSyncError> for UpstreamRetryStrategy {
    type Output = RetryPolicy;

    fn delay(&mut self, _attempt: u32, error: &'a ProofSyncError) -> Self::Output {
        if error.is_retryable() {
            let prev_delay = self.delay;
            self.delay = self.delay.saturating_mul(2);
            RetryPolicy::Delay(prev_delay)
        } else {
            RetryPolicy::Break
        }
    }
}
