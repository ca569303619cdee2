// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use btp_relayer_types::TxHash;
use btp_relayer_utils::{Error, Result};

/// ICON JSON-RPC system error.
pub const JSONRPC_ERROR_CODE_SYSTEM: i64 = -31000;
/// Transaction pool overflow.
pub const JSONRPC_ERROR_CODE_TX_POOL_OVERFLOW: i64 = -31001;
/// Transaction still pending.
pub const JSONRPC_ERROR_CODE_PENDING: i64 = -31002;
/// Transaction currently executing.
pub const JSONRPC_ERROR_CODE_EXECUTING: i64 = -31003;

/// System error sub-code: the transaction is already known.
pub const DUPLICATE_TRANSACTION_ERROR: i64 = 2000;
/// System error sub-code: the transaction timestamp expired.
pub const EXPIRED_TRANSACTION_ERROR: i64 = 2001;
/// System error sub-code: the transaction timestamp is in the future.
pub const FUTURE_TRANSACTION_ERROR: i64 = 2002;
/// System error sub-code: the pool rejected the transaction.
pub const TRANSACTION_POOL_OVERFLOW_ERROR: i64 = 2003;

/// Parses an `0x`-prefixed hex integer.
pub fn hex_to_i64(s: &str) -> Result<i64> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = i64::from_str_radix(rest.trim_start_matches("0x"), 16)
        .map_err(|_| Error::Generic("malformed hex integer"))?;
    Ok(if negative { -value } else { value })
}

/// Parses an `0x`-prefixed hex integer as unsigned.
pub fn hex_to_u64(s: &str) -> Result<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| Error::Generic("malformed hex integer"))
}

/// Renders a signed integer in ICON hex form (`-0x..` for negatives).
pub fn to_hex(value: i64) -> String {
    if value < 0 {
        format!("-0x{:x}", -value)
    } else {
        format!("0x{value:x}")
    }
}

/// A JSON-RPC 2.0 transport.
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Performs one request and returns the `result` value.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC transport backed by reqwest.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: url::Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport against the given endpoint URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.parse()?,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait::async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Error::ConnectFailed(e.to_string())
                } else {
                    Error::from(e)
                }
            })?;
        let rpc: RpcResponse = response.json().await?;
        if let Some(err) = rpc.error {
            return Err(Error::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(rpc.result.unwrap_or(Value::Null))
    }
}

/// Terminal transaction receipt as returned by the node.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResultResponse {
    /// Hash of the executed transaction.
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    /// `"0x1"` on success.
    pub status: String,
    /// Block the transaction was included in.
    #[serde(rename = "blockHeight")]
    pub block_height: String,
    /// Failure details when `status` is not success.
    #[serde(default)]
    pub failure: Option<FailureReason>,
}

/// Failure code and message of a reverted execution.
#[derive(Debug, Clone, Deserialize)]
pub struct FailureReason {
    /// Hex failure code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

/// Typed ICON JSON-RPC client over any transport.
pub struct Client<T: RpcTransport> {
    transport: Arc<T>,
}

impl<T: RpcTransport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: RpcTransport> Client<T> {
    /// Wraps a transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Read-only SCORE call (`icx_call`).
    pub async fn call<R: DeserializeOwned>(&self, params: Value) -> Result<R> {
        let value = self.transport.request("icx_call", params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Submits a signed transaction and returns its hash.
    pub async fn send_transaction(&self, params: Value) -> Result<TxHash> {
        let value = self
            .transport
            .request("icx_sendTransaction", params)
            .await?;
        let hash: String = serde_json::from_value(value)?;
        Ok(TxHash(hash))
    }

    /// Fetches the receipt of a transaction.
    pub async fn get_transaction_result(
        &self,
        hash: &TxHash,
    ) -> Result<TransactionResultResponse> {
        let value = self
            .transport
            .request(
                "icx_getTransactionResult",
                json!({ "txHash": hash.0 }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Height of the latest finalized block.
    pub async fn get_last_block_height(&self) -> Result<i64> {
        let value = self
            .transport
            .request("icx_getLastBlock", json!({}))
            .await?;
        let height = value
            .get("height")
            .and_then(Value::as_i64)
            .ok_or(Error::Generic("block response without height"))?;
        Ok(height)
    }

    /// Serialized header of the block at `height`, base64 encoded.
    pub async fn get_block_header_by_height(
        &self,
        height: i64,
    ) -> Result<String> {
        let value = self
            .transport
            .request(
                "icx_getBlockHeaderByHeight",
                json!({ "height": to_hex(height) }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Commit votes for the block at `height`, base64 encoded.
    pub async fn get_votes_by_height(&self, height: i64) -> Result<String> {
        let value = self
            .transport
            .request(
                "icx_getVotesByHeight",
                json!({ "height": to_hex(height) }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}
