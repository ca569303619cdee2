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

#![warn(missing_docs)]
//! # Chain Traits Module
//!
//! Capability traits the relay pipeline consumes. A `Sender` talks to the
//! destination chain, a `Receiver` monitors the source chain; both are
//! network adapters and may suspend on any call.

use std::sync::Arc;

use btp_relayer_types::{
    BlockUpdate, BmcLinkStatus, ReceiptProof, Segment, TransactionResult,
    TxHash,
};
use btp_relayer_utils::Result;

/// Invoked once a monitor/receive loop has established its connection.
pub type OnConnect = Box<dyn FnOnce() + Send>;

/// Handles finalized destination blocks.
#[async_trait::async_trait]
pub trait DstBlockHandler: Send + Sync {
    /// Called once per finalized destination block, in order.
    async fn on_block_of_dst(&self, height: i64) -> Result<()>;
}

/// Handles verified source blocks and their receipt proofs.
#[async_trait::async_trait]
pub trait SrcBlockHandler: Send + Sync {
    /// Called once per source block in strict ascending height order.
    async fn on_block_of_src(
        &self,
        block_update: BlockUpdate,
        receipt_proofs: Vec<ReceiptProof>,
    ) -> Result<()>;
}

/// The destination chain adapter.
#[async_trait::async_trait]
pub trait Sender: Send + Sync + 'static {
    /// Submits a segment, fragmenting payloads larger than the transport
    /// limit internally, and returns the handle of the final submission.
    async fn relay(&self, segment: &Segment) -> Result<TxHash>;

    /// Polls the submission until a terminal status. Transient transport
    /// conditions are retried internally.
    async fn get_result(&self, param: &TxHash) -> Result<TransactionResult>;

    /// Queries the BMC link status.
    async fn get_status(&self) -> Result<BmcLinkStatus>;

    /// Drives `handler` once per finalized destination block, starting from
    /// `height`. Returns only on error.
    async fn monitor_loop(
        &self,
        height: i64,
        handler: Arc<dyn DstBlockHandler>,
        on_connect: OnConnect,
    ) -> Result<()>;

    /// Hard per-transaction byte budget of the destination.
    fn tx_size_limit(&self) -> usize;
}

/// The source chain adapter.
#[async_trait::async_trait]
pub trait Receiver: Send + Sync + 'static {
    /// Drives `handler` once per verified source block, starting from
    /// `height` with `seq` as the next expected event sequence. Returns only
    /// on error.
    async fn receive_loop(
        &self,
        height: i64,
        seq: u64,
        handler: Arc<dyn SrcBlockHandler>,
        on_connect: OnConnect,
    ) -> Result<()>;
}
