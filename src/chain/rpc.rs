//! JSON-RPC 2.0 client for the account-query protocol.

use super::ChainClient;
use crate::error::RpcError;
use crate::models::{DeploymentTarget, OnChainProgramState};
use base64::Engine;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `{"context": {...}, "value": T}` wrapper used by most account methods.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    lamports: u64,
    owner: String,
    executable: bool,
    /// `[payload, encoding]`
    data: (String, String),
}

/// HTTP JSON-RPC client bound to one endpoint and commitment.
pub struct RpcChainClient {
    http: reqwest::Client,
    target: DeploymentTarget,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(target: DeploymentTarget) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(RpcChainClient {
            http,
            target,
            next_id: AtomicU64::new(1),
        })
    }

    fn commitment_config(&self) -> Value {
        json!({ "commitment": self.target.commitment.as_str() })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        log::debug!("[Chain] [RPC] -> {} (id {})", method, id);

        let response = self
            .http
            .post(&self.target.network_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(format!("{}: {}", method, e)))?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| RpcError::Malformed(format!("{}: response has no result", method)))?;
        serde_json::from_value(result).map_err(|e| RpcError::Malformed(format!("{}: {}", method, e)))
    }
}

impl ChainClient for RpcChainClient {
    fn get_balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<u64, RpcError>> {
        Box::pin(async move {
            let balance: WithContext<u64> = self
                .call("getBalance", json!([address, self.commitment_config()]))
                .await?;
            log::debug!("[Chain] [RPC] <- getBalance {} = {}", address, balance.value);
            Ok(balance.value)
        })
    }

    fn get_account<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, Result<OnChainProgramState, RpcError>> {
        Box::pin(async move {
            let mut config = self.commitment_config();
            config["encoding"] = json!("base64");
            let info: WithContext<Option<AccountInfo>> =
                self.call("getAccountInfo", json!([address, config])).await?;

            let state = match info.value {
                None => OnChainProgramState::missing(),
                Some(account) => {
                    let data_length = decode_data_length(&account.data)?;
                    OnChainProgramState {
                        exists: true,
                        executable: account.executable,
                        owner: account.owner,
                        data_length,
                        balance: account.lamports,
                    }
                }
            };
            log::debug!(
                "[Chain] [RPC] <- getAccountInfo {} exists={} executable={}",
                address,
                state.exists,
                state.executable
            );
            Ok(state)
        })
    }

    fn get_slot(&self) -> BoxFuture<'_, Result<u64, RpcError>> {
        Box::pin(async move { self.call("getSlot", json!([self.commitment_config()])).await })
    }
}

fn decode_data_length(data: &(String, String)) -> Result<u64, RpcError> {
    let (payload, encoding) = data;
    if encoding != "base64" {
        return Err(RpcError::Malformed(format!(
            "unexpected account data encoding '{}'",
            encoding
        )));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| RpcError::Malformed(format!("account data is not base64: {}", e)))?;
    Ok(bytes.len() as u64)
}
