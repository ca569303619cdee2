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

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use btp_relayer_chain_traits::{
    DstBlockHandler, Receiver, Sender, SrcBlockHandler,
};
use btp_relayer_mta::ExtAccumulator;
use btp_relayer_store::SledStore;
use btp_relayer_types::{
    BlockProof, BlockUpdate, BlockWitness, BmcLinkStatus, BtpAddress,
    ReceiptProof, RevertCode, Segment,
};
use btp_relayer_utils::{probe, Error, Result};

use crate::queue::{self, MessageQueue};
use crate::segment;

/// The relay pipeline for one directed link.
///
/// Three long-lived tasks cooperate around this state: the source receive
/// loop ingests block updates, the destination monitor loop prunes delivered
/// content, and the dispatch loop submits segments. One short-lived result
/// task settles each in-flight segment.
pub struct RelayLink<S: Sender> {
    src: BtpAddress,
    dst: BtpAddress,
    sender: Arc<S>,
    acc: Mutex<ExtAccumulator>,
    queue: tokio::sync::RwLock<MessageQueue>,
    bs: parking_lot::RwLock<BmcLinkStatus>,
    height_of_dst: AtomicI64,
    relay_tx: mpsc::Sender<()>,
    relay_rx: Mutex<Option<mpsc::Receiver<()>>>,
    err_tx: mpsc::Sender<Error>,
    err_rx: Mutex<Option<mpsc::Receiver<Error>>>,
}

impl<S: Sender> RelayLink<S> {
    /// Opens the link state, recovering the accumulator from the store.
    pub fn new(
        src: BtpAddress,
        dst: BtpAddress,
        sender: Arc<S>,
        store: &SledStore,
        offset: i64,
    ) -> Result<Arc<Self>> {
        let acc = ExtAccumulator::open(store, offset)?;
        // capacity 2, sends are non-blocking with drop-on-full
        let (relay_tx, relay_rx) = mpsc::channel(2);
        let (err_tx, err_rx) = mpsc::channel(1);
        Ok(Arc::new(Self {
            queue: tokio::sync::RwLock::new(MessageQueue::new(src.clone())),
            src,
            dst,
            sender,
            acc: Mutex::new(acc),
            bs: parking_lot::RwLock::new(BmcLinkStatus::default()),
            height_of_dst: AtomicI64::new(0),
            relay_tx,
            relay_rx: Mutex::new(Some(relay_rx)),
            err_tx,
            err_rx: Mutex::new(Some(err_rx)),
        }))
    }

    /// Source link address.
    pub fn src(&self) -> &BtpAddress {
        &self.src
    }

    /// Destination link address.
    pub fn dst(&self) -> &BtpAddress {
        &self.dst
    }

    /// Height of the last accumulated source block.
    pub fn accumulator_height(&self) -> i64 {
        self.acc.lock().height()
    }

    /// Number of queued relay messages, including the tail placeholder.
    pub async fn queued_messages(&self) -> usize {
        self.queue.read().await.len()
    }

    /// Whether the queue holds nothing but an empty placeholder.
    pub async fn queue_is_drained(&self) -> bool {
        let queue = self.queue.read().await;
        queue.len() == 1
            && queue.iter().next().is_some_and(|rm| {
                rm.block_updates.is_empty()
                    && rm.receipt_proofs.is_empty()
                    && rm.block_proof.is_none()
            })
    }

    fn monitor_height(&self) -> i64 {
        self.height_of_dst.load(Ordering::SeqCst)
    }

    fn verifier_height(&self) -> i64 {
        self.bs.read().verifier.height
    }

    /// Re-queries the destination link status.
    pub async fn refresh_status(&self) -> Result<()> {
        let status = self.sender.get_status().await?;
        *self.bs.write() = status;
        Ok(())
    }

    /// Height the source receiver should resume from.
    pub fn receive_height(&self) -> i64 {
        let bs = self.bs.read();
        let acc_height = self.acc.lock().height();
        let next = acc_height.max(bs.verifier.offset) + 1;
        next.min(bs.verifier.last_height)
    }

    fn signal_relay(&self) {
        // at-least-one-wake semantics; a full channel already guarantees one
        if let Err(mpsc::error::TrySendError::Closed(())) =
            self.relay_tx.try_send(())
        {
            tracing::debug!("relay loop is gone, dropping wake signal");
        }
    }

    fn update_mta(&self, block_update: &BlockUpdate) -> Result<()> {
        let mut acc = self.acc.lock();
        let next = acc.height() + 1;
        if next < block_update.height {
            return Err(Error::MissingBlock {
                expected: next,
                got: block_update.height,
            });
        }
        if next == block_update.height {
            acc.add_hash(block_update.block_hash.clone());
            // the queue cannot advance without a durable accumulator
            acc.flush()?;
        }
        Ok(())
    }

    fn new_block_proof(
        &self,
        height: i64,
        header: &[u8],
    ) -> Result<BlockProof> {
        let (at, verifier_offset) = {
            let bs = self.bs.read();
            (bs.verifier.height, bs.verifier.offset)
        };
        let (effective_at, witness) =
            self.acc.lock().witness_for_at(height, at, verifier_offset)?;
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Accumulator,
            height,
            at = effective_at,
            witnesses = witness.len(),
            "synthesized block proof",
        );
        Ok(BlockProof {
            height,
            header: header.to_vec(),
            block_witness: BlockWitness {
                height: effective_at,
                witness,
            },
        })
    }

    async fn update_relay_message(&self, h: i64, seq: u64) -> Result<()> {
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Queue,
            h,
            seq,
            monitor_height = self.monitor_height(),
            "applying destination acknowledgement",
        );
        let mut queue = self.queue.write().await;
        queue::update_relay_message(
            &mut queue,
            h,
            seq,
            &mut |height: i64, header: &[u8]| {
                self.new_block_proof(height, header)
            },
        )
    }

    /// One dispatch pass: scans the queue head to tail and submits every
    /// segment that is ready. Holding the queue write lock for the whole
    /// pass keeps submissions atomic with respect to pruning; the
    /// single-dispatcher invariant makes this equivalent to a shared scan.
    async fn relay_pass(self: Arc<Self>) -> Result<()> {
        let limit = self.sender.tx_size_limit();
        let verifier_height = self.verifier_height();
        let mut queue = self.queue.write().await;
        for rm in queue.iter_mut() {
            if rm.block_updates.is_empty() && rm.receipt_proofs.is_empty() {
                continue;
            }
            if rm.has_wait() {
                // later entries must not overtake an in-flight submission
                break;
            }
            if rm.segments.is_empty() {
                let packed = segment::segment(rm, verifier_height, limit)?;
                rm.segments = packed;
            }
            let pending: Vec<Arc<Segment>> = rm
                .segments
                .iter()
                .filter(|s| s.get_result_param().is_none())
                .cloned()
                .collect();
            if pending.is_empty() {
                // everything was delivered; re-segment on the next pass
                // against a fresher verifier view
                rm.segments.clear();
                continue;
            }
            for seg in pending {
                seg.begin_submission();
                let param = self.sender.relay(&seg).await?;
                tracing::debug!(
                    target: probe::TARGET,
                    kind = %probe::Kind::RelayTx,
                    rm = rm.seq,
                    height = seg.height,
                    block_updates = seg.number_of_block_update,
                    event_sequence = seg.event_sequence,
                    events = seg.number_of_event,
                    tx = %param,
                    "segment submitted",
                );
                seg.set_get_result_param(param);
                let link = Arc::clone(&self);
                tokio::spawn(async move { link.settle_result(seg).await });
            }
        }
        Ok(())
    }

    /// Polls one submitted segment to a terminal state and reacts to the
    /// destination's typed revert codes.
    async fn settle_result(&self, seg: Arc<Segment>) {
        let Some(param) = seg.get_result_param() else {
            return;
        };
        match self.sender.get_result(&param).await {
            Ok(result) => {
                tracing::debug!(
                    target: probe::TARGET,
                    kind = %probe::Kind::RelayTx,
                    tx = %param,
                    height = result.block_height,
                    "segment delivered",
                );
                seg.set_transaction_result(result);
            }
            Err(err) => match err.revert_code() {
                Some(RevertCode::BmvUnknown) => {
                    tracing::warn!(
                        tx = %param,
                        "BMVUnknown from the verifier, leaving segment in flight",
                    );
                }
                Some(
                    RevertCode::BmvNotVerifiable
                    | RevertCode::BmvAlreadyVerified
                    | RevertCode::BmcRevertUnauthorized,
                ) => {
                    tracing::debug!(
                        tx = %param,
                        error = %err,
                        "resetting segment for re-dispatch",
                    );
                    seg.clear_get_result_param();
                }
                Some(code) => {
                    tracing::error!(
                        tx = %param,
                        %code,
                        "unrecoverable revert from destination",
                    );
                    let _ = self.err_tx.try_send(err);
                }
                None => {
                    tracing::debug!(
                        tx = %param,
                        error = %err,
                        "transport error while polling result, leaving state unchanged",
                    );
                }
            },
        }
    }

    /// Runs the link: seeds state from the destination, spawns the dispatch
    /// loop and drives the monitor and receive loops until the first
    /// unrecoverable error.
    pub async fn serve(
        self: Arc<Self>,
        receiver: Arc<dyn Receiver>,
    ) -> Result<()> {
        self.refresh_status().await?;
        {
            let bs = self.bs.read();
            self.height_of_dst
                .store(bs.current_height, Ordering::SeqCst);
            tracing::debug!(
                target: probe::TARGET,
                kind = %probe::Kind::Lifecycle,
                src = %self.src,
                dst = %self.dst,
                verifier_height = bs.verifier.height,
                rx_seq = bs.rx_seq,
                current_height = bs.current_height,
                starting = true,
            );
        }

        let mut relay_rx = self
            .relay_rx
            .lock()
            .take()
            .ok_or(Error::Generic("relay link already served"))?;
        let mut err_rx = self
            .err_rx
            .lock()
            .take()
            .ok_or(Error::Generic("relay link already served"))?;

        let dispatch: JoinHandle<Result<()>> = {
            let link = Arc::clone(&self);
            tokio::spawn(async move {
                tracing::debug!("start relay loop");
                while relay_rx.recv().await.is_some() {
                    Arc::clone(&link).relay_pass().await?;
                }
                tracing::debug!("stop relay loop");
                Ok(())
            })
        };

        let monitor: JoinHandle<Result<()>> = {
            let sender = Arc::clone(&self.sender);
            let handler: Arc<dyn DstBlockHandler> = Arc::clone(&self) as Arc<dyn DstBlockHandler>;
            let height = self.monitor_height();
            tokio::spawn(async move {
                sender
                    .monitor_loop(
                        height,
                        handler,
                        Box::new(|| {
                            tracing::debug!("monitor loop connected");
                        }),
                    )
                    .await
            })
        };

        let receive: JoinHandle<Result<()>> = {
            let handler: Arc<dyn SrcBlockHandler> = Arc::clone(&self) as Arc<dyn SrcBlockHandler>;
            let height = self.receive_height();
            let seq = self.bs.read().rx_seq;
            tokio::spawn(async move {
                receiver
                    .receive_loop(
                        height,
                        seq,
                        handler,
                        Box::new(|| {
                            tracing::debug!("receive loop connected");
                        }),
                    )
                    .await
            })
        };

        fn flatten(
            joined: std::result::Result<Result<()>, tokio::task::JoinError>,
        ) -> Result<()> {
            joined.unwrap_or(Err(Error::TaskStoppedAbnormally))
        }

        let outcome = tokio::select! {
            r = dispatch => flatten(r),
            r = monitor => flatten(r),
            r = receive => flatten(r),
            fatal = err_rx.recv() => {
                Err(fatal.unwrap_or(Error::TaskStoppedAbnormally))
            }
        };
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Lifecycle,
            src = %self.src,
            dst = %self.dst,
            stopping = true,
        );
        outcome
    }
}

#[async_trait::async_trait]
impl<S: Sender> SrcBlockHandler for RelayLink<S> {
    async fn on_block_of_src(
        &self,
        block_update: BlockUpdate,
        receipt_proofs: Vec<ReceiptProof>,
    ) -> Result<()> {
        tracing::trace!(
            acc_height = self.acc.lock().height(),
            bu = block_update.height,
            "on_block_of_src",
        );
        self.update_mta(&block_update)?;
        let verifier_height = self.verifier_height();
        let height_of_dst = self.monitor_height();
        {
            let mut queue = self.queue.write().await;
            queue::add_relay_message(
                &mut queue,
                block_update,
                receipt_proofs,
                verifier_height,
                height_of_dst,
            )?;
        }
        self.signal_relay();
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Sender> DstBlockHandler for RelayLink<S> {
    async fn on_block_of_dst(&self, height: i64) -> Result<()> {
        tracing::trace!(height, "on_block_of_dst");
        self.height_of_dst.store(height, Ordering::SeqCst);
        let before = {
            let bs = self.bs.read();
            (bs.verifier.height, bs.rx_seq)
        };
        self.refresh_status().await?;
        let after = {
            let bs = self.bs.read();
            (bs.verifier.height, bs.rx_seq)
        };
        if before != after {
            self.update_relay_message(after.0, after.1).await?;
            self.signal_relay();
        }
        Ok(())
    }
}
