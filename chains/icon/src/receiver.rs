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

use std::sync::Arc;
use std::time::Duration;

use alloy_rlp::RlpEncodable;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use sha3::{Digest, Sha3_256};

use btp_relayer_chain_traits::{OnConnect, Receiver, SrcBlockHandler};
use btp_relayer_types::{BlockUpdate, BtpAddress};
use btp_relayer_utils::retry::PollRetry;
use btp_relayer_utils::{probe, Error, Result};

use crate::client::{Client, RpcTransport};

const RECEIVE_INTERVAL: Duration = Duration::from_secs(1);

// verifier input: the serialized header together with its commit votes
#[derive(RlpEncodable)]
struct BlockUpdateProof {
    header: Bytes,
    votes: Bytes,
}

/// Polls an ICON source chain for finalized blocks and feeds them to the
/// relay pipeline in strict height order.
///
/// TODO wire the websocket event filter monitor so receipt proofs flow
/// (`icx_getProofForEvents` per filtered block notification); until then
/// this receiver delivers block updates only.
pub struct IconReceiver<T: RpcTransport> {
    client: Client<T>,
    src: BtpAddress,
    dst: BtpAddress,
}

impl<T: RpcTransport> IconReceiver<T> {
    /// Builds the receiver for one link.
    pub fn new(client: Client<T>, src: BtpAddress, dst: BtpAddress) -> Self {
        Self { client, src, dst }
    }

    async fn block_update(&self, height: i64) -> Result<BlockUpdate> {
        let header_b64 =
            self.client.get_block_header_by_height(height).await?;
        let votes_b64 = self.client.get_votes_by_height(height).await?;
        let header = STANDARD
            .decode(header_b64)
            .map_err(|_| Error::Generic("malformed block header encoding"))?;
        let votes = STANDARD
            .decode(votes_b64)
            .map_err(|_| Error::Generic("malformed votes encoding"))?;
        let block_hash = Sha3_256::digest(&header).to_vec();
        let proof = alloy_rlp::encode(&BlockUpdateProof {
            header: Bytes::from(header.clone()),
            votes: Bytes::from(votes),
        });
        Ok(BlockUpdate {
            height,
            block_hash,
            header,
            proof,
        })
    }
}

#[async_trait::async_trait]
impl<T: RpcTransport> Receiver for IconReceiver<T> {
    async fn receive_loop(
        &self,
        height: i64,
        seq: u64,
        handler: Arc<dyn SrcBlockHandler>,
        on_connect: OnConnect,
    ) -> Result<()> {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            src = %self.src,
            dst = %self.dst,
            height,
            seq,
            "starting receive loop",
        );
        let mut connected = Some(on_connect);
        let mut next = height.max(1);
        let mut retries = PollRetry::new(RECEIVE_INTERVAL);
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
                        "receive poll failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(err) => return Err(err),
            };
            while next <= latest {
                let block_update = self.block_update(next).await?;
                handler.on_block_of_src(block_update, Vec::new()).await?;
                next += 1;
            }
            tokio::time::sleep(RECEIVE_INTERVAL).await;
        }
    }
}
