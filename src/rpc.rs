//! Node JSON-RPC transport
//!
//! Shared by the Graphene, Steem and Steem Engine node clients. All calls are
//! plain request/response with the timeout configured for the node.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("RPC transport failed: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Failed to decode RPC response: {0}")]
    Decode(String),

    /// The node or the signer rejected the transaction for lack of a key.
    #[error("Missing authority: {0}")]
    MissingAuthority(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// Whether a node error message means the transaction lacked a signature.
pub fn is_authority_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("missing required active authority")
        || lower.contains("missing active authority")
        || lower.contains("missing required posting authority")
        || lower.contains("missing authority")
}

/// HTTP JSON-RPC client for one node endpoint
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    url: String,
    http: reqwest::Client,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make a JSON-RPC call.
    ///
    /// A `null` result deserializes into `R` as-is, so callers that expect a
    /// missing object ask for `Option<T>`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        debug!(url = %self.url, method, "rpc call");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("HTTP request failed: {}", e)))?;

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            if is_authority_error(&error.message) {
                return Err(RpcError::MissingAuthority(error.message));
            }
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(rpc_response.result)
            .map_err(|e| RpcError::Decode(format!("{} result: {}", method, e)))
    }

    /// Plain HTTP GET returning JSON, for REST-style history endpoints.
    pub async fn get<R>(&self, url: &str, query: &[(&str, String)]) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        debug!(url, "http get");

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RpcError::Transport(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("Failed to parse response: {}", e)))
    }
}
