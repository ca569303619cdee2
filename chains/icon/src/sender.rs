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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde_json::{json, Value};
use sha3::{Digest, Sha3_256};

use btp_relayer_chain_traits::{DstBlockHandler, OnConnect, Sender};
use btp_relayer_types::wire::{self, VerifierStatusExtra};
use btp_relayer_types::{
    BmcLinkStatus, BtpAddress, Segment, TransactionResult, TxHash,
    VerifierStatus,
};
use btp_relayer_utils::retry::PollRetry;
use btp_relayer_utils::{probe, Error, Result};

use crate::client::{
    self, Client, RpcTransport, TransactionResultResponse,
};
use crate::wallet::Wallet;

/// Raw transaction data budget of an ICON node (512 kB).
pub const TX_MAX_DATA_SIZE: usize = 512 * 1024;
/// Base64 encoding overhead 0.36, rlp and other fields 0.01.
pub const TX_OVERHEAD_SCALE: f64 = 0.37;
/// maxStepLimit(invoke), refer https://www.icondev.io/docs/step-estimation
pub const DEFAULT_STEP_LIMIT: i64 = 0x9502f900;

const GET_RESULT_INTERVAL: Duration = Duration::from_secs(1);
const RELAY_RESEND_INTERVAL: Duration = Duration::from_secs(1);
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// BMC method accepting a whole relay message.
pub const BMC_RELAY_METHOD: &str = "handleRelayMessage";
/// BMC method accepting one fragment of a relay message.
pub const BMC_FRAGMENT_METHOD: &str = "handleFragment";
/// BMC link status query.
pub const BMC_GET_STATUS_METHOD: &str = "getStatus";

const RESULT_STATUS_SUCCESS: &str = "0x1";
const RESULT_FAILURE_CODE_REVERT: i64 = 32;
const RESULT_FAILURE_CODE_END: i64 = 99;

/// Usable relay payload per transaction once encoding overhead is paid.
pub fn tx_size_limit() -> usize {
    (TX_MAX_DATA_SIZE as f64 / (1.0 + TX_OVERHEAD_SCALE)).ceil() as usize
}

/// The destination-side Sender adapter for ICON.
pub struct IconSender<T: RpcTransport> {
    client: Client<T>,
    src: BtpAddress,
    dst: BtpAddress,
    wallet: Arc<dyn Wallet>,
    step_limit: i64,
}

impl<T: RpcTransport> IconSender<T> {
    /// Builds the sender; `options` may carry a `step-limit` override.
    pub fn new(
        client: Client<T>,
        src: BtpAddress,
        dst: BtpAddress,
        wallet: Arc<dyn Wallet>,
        options: &HashMap<String, Value>,
    ) -> Self {
        let step_limit = options
            .get("step-limit")
            .and_then(Value::as_i64)
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_STEP_LIMIT);
        Self {
            client,
            src,
            dst,
            wallet,
            step_limit,
        }
    }

    fn transaction(&self, method: &str, params: Value) -> Value {
        json!({
            "version": "0x3",
            "from": self.wallet.address(),
            "to": self.dst.account(),
            "nid": self.dst.network_id(),
            "stepLimit": client::to_hex(self.step_limit),
            "dataType": "call",
            "data": {
                "method": method,
                "params": params,
            },
        })
    }

    fn sign_transaction(&self, tx: &mut Value) -> Result<TxHash> {
        let obj = tx
            .as_object_mut()
            .ok_or(Error::Generic("transaction is not an object"))?;
        obj.remove("signature");
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Wallet(e.to_string()))?
            .as_micros() as i64;
        obj.insert(
            "timestamp".to_owned(),
            Value::String(client::to_hex(timestamp)),
        );
        let digest = transaction_digest(tx);
        let signature = self.wallet.sign(&digest)?;
        tx.as_object_mut()
            .expect("checked above")
            .insert(
                "signature".to_owned(),
                Value::String(STANDARD.encode(signature)),
            );
        Ok(TxHash(format!("0x{}", hex::encode(digest))))
    }

    async fn send_transaction(&self, mut tx: Value) -> Result<TxHash> {
        'sign: loop {
            let local_hash = self.sign_transaction(&mut tx)?;
            loop {
                match self.client.send_transaction(tx.clone()).await {
                    Ok(hash) => return Ok(hash),
                    Err(Error::JsonRpc { code, message }) => match code {
                        client::JSONRPC_ERROR_CODE_TX_POOL_OVERFLOW => {
                            tokio::time::sleep(RELAY_RESEND_INTERVAL).await;
                        }
                        client::JSONRPC_ERROR_CODE_SYSTEM => {
                            match system_sub_code(&message) {
                                Some(client::DUPLICATE_TRANSACTION_ERROR) => {
                                    tracing::debug!(
                                        tx = %local_hash,
                                        "duplicate transaction, treating as submitted",
                                    );
                                    return Ok(local_hash);
                                }
                                Some(client::EXPIRED_TRANSACTION_ERROR) => {
                                    continue 'sign;
                                }
                                _ => {
                                    return Err(Error::JsonRpc {
                                        code,
                                        message,
                                    })
                                }
                            }
                        }
                        _ => return Err(Error::JsonRpc { code, message }),
                    },
                    Err(err) => return Err(err),
                }
            }
        }
    }

    async fn send_fragment(&self, fragment: &[u8], index: i64) -> Result<TxHash> {
        let params = json!({
            "_prev": self.src.to_string(),
            "_msg": URL_SAFE.encode(fragment),
            "_idx": client::to_hex(index),
        });
        self.send_transaction(self.transaction(BMC_FRAGMENT_METHOD, params))
            .await
    }
}

// system error messages carry the sub-code in positions 1..5
fn system_sub_code(message: &str) -> Option<i64> {
    message.get(1..5).and_then(|s| s.parse().ok())
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, '\\' | '.' | '{' | '}' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn serialize_into(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("\\0"),
        Value::String(s) => escape_into(out, s),
        Value::Object(map) => {
            out.push('{');
            let mut first = true;
            // serde_json maps iterate in key order
            for (key, item) in map {
                if !first {
                    out.push('.');
                }
                first = false;
                escape_into(out, key);
                out.push('.');
                serialize_into(out, item);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            let mut first = true;
            for item in items {
                if !first {
                    out.push('.');
                }
                first = false;
                serialize_into(out, item);
            }
            out.push(']');
        }
        other => escape_into(out, &other.to_string()),
    }
}

/// SHA3-256 over the canonical `icx_sendTransaction` serialization,
/// excluding the signature field.
fn transaction_digest(tx: &Value) -> Vec<u8> {
    let mut canonical = String::from("icx_sendTransaction");
    if let Value::Object(map) = tx {
        for (key, item) in map {
            if key == "signature" {
                continue;
            }
            canonical.push('.');
            escape_into(&mut canonical, key);
            canonical.push('.');
            serialize_into(&mut canonical, item);
        }
    }
    Sha3_256::digest(canonical.as_bytes()).to_vec()
}

fn map_transaction_result(
    response: TransactionResultResponse,
) -> Result<TransactionResult> {
    if response.status == RESULT_STATUS_SUCCESS {
        return Ok(TransactionResult {
            tx_hash: TxHash(response.tx_hash),
            block_height: client::hex_to_i64(&response.block_height)?,
        });
    }
    let (code, message) = match response.failure {
        Some(failure) => {
            (client::hex_to_i64(&failure.code)?, failure.message)
        }
        None => (0, "execution failure without reason".to_owned()),
    };
    if (RESULT_FAILURE_CODE_REVERT..=RESULT_FAILURE_CODE_END).contains(&code)
    {
        let revert = (code - RESULT_FAILURE_CODE_REVERT) as u32;
        return Err(Error::Revert(
            btp_relayer_types::RevertCode::from_code(revert),
        ));
    }
    Err(Error::JsonRpc { code, message })
}

#[async_trait::async_trait]
impl<T: RpcTransport> Sender for IconSender<T> {
    async fn relay(&self, segment: &Segment) -> Result<TxHash> {
        let msg = segment.transaction_param();
        let limit = tx_size_limit();
        let mut index = (msg.len() / limit) as i64;
        if index == 0 {
            let params = json!({
                "_prev": self.src.to_string(),
                "_msg": URL_SAFE.encode(&msg),
            });
            return self
                .send_transaction(self.transaction(BMC_RELAY_METHOD, params))
                .await;
        }
        // fragments carry a decreasing remaining count, the first negated
        let mut handle = self.send_fragment(&msg[..limit], -index).await?;
        let mut rest = &msg[limit..];
        index -= 1;
        while index > 0 {
            handle = self.send_fragment(&rest[..limit], index).await?;
            rest = &rest[limit..];
            index -= 1;
        }
        handle = self.send_fragment(rest, index).await?;
        Ok(handle)
    }

    async fn get_result(&self, param: &TxHash) -> Result<TransactionResult> {
        loop {
            match self.client.get_transaction_result(param).await {
                Ok(response) => return map_transaction_result(response),
                Err(Error::JsonRpc { code, .. })
                    if code == client::JSONRPC_ERROR_CODE_PENDING
                        || code == client::JSONRPC_ERROR_CODE_EXECUTING =>
                {
                    tokio::time::sleep(GET_RESULT_INTERVAL).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_status(&self) -> Result<BmcLinkStatus> {
        #[derive(serde::Deserialize)]
        struct VerifierResponse {
            height: String,
            extra: String,
        }
        #[derive(serde::Deserialize)]
        struct StatusResponse {
            tx_seq: String,
            rx_seq: String,
            verifier: VerifierResponse,
            cur_height: String,
        }

        let params = json!({
            "to": self.dst.account(),
            "dataType": "call",
            "data": {
                "method": BMC_GET_STATUS_METHOD,
                "params": { "_link": self.src.to_string() },
            },
        });
        let response: StatusResponse = self.client.call(params).await?;
        let extra = hex::decode(
            response.verifier.extra.trim_start_matches("0x"),
        )
        .map_err(|_| Error::Generic("malformed verifier extra"))?;
        let decoded: VerifierStatusExtra = wire::decode(&extra)?;
        Ok(BmcLinkStatus {
            tx_seq: client::hex_to_u64(&response.tx_seq)?,
            rx_seq: client::hex_to_u64(&response.rx_seq)?,
            verifier: VerifierStatus {
                height: client::hex_to_i64(&response.verifier.height)?,
                extra,
                offset: decoded.offset as i64,
                last_height: decoded.last_height as i64,
            },
            current_height: client::hex_to_i64(&response.cur_height)?,
        })
    }

    async fn monitor_loop(
        &self,
        height: i64,
        handler: Arc<dyn DstBlockHandler>,
        on_connect: OnConnect,
    ) -> Result<()> {
        let mut connected = Some(on_connect);
        let mut next = height.max(1);
        let mut retries = PollRetry::new(MONITOR_INTERVAL);
        loop {
            let latest = match self.client.get_last_block_height().await {
                Ok(latest) => {
                    if let Some(cb) = connected.take() {
                        cb();
                    }
                    retries.succeeded();
                    latest
                }
                Err(err @ (Error::ConnectFailed(_) | Error::Reqwest(_))) => {
                    let Some(delay) = retries.next_delay() else {
                        return Err(err);
                    };
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::WARN,
                        kind = %probe::Kind::Retry,
                        error = %err,
                        "monitor poll failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(err) => return Err(err),
            };
            while next <= latest {
                handler.on_block_of_dst(next).await?;
                next += 1;
            }
            tokio::time::sleep(MONITOR_INTERVAL).await;
        }
    }

    fn tx_size_limit(&self) -> usize {
        tx_size_limit()
    }
}
