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

use std::collections::VecDeque;

use btp_relayer_types::{
    BlockProof, BlockUpdate, BtpAddress, ReceiptProof, RelayMessage,
};
use btp_relayer_utils::{probe, Error, Result};

/// The ordered queue of pending relay messages.
///
/// Invariant: the queue is never empty; after pruning removes the last entry
/// an empty placeholder is appended. Only the tail entry is mutated by
/// ingestion.
#[derive(Debug)]
pub struct MessageQueue {
    entries: VecDeque<RelayMessage>,
    from: BtpAddress,
    next_seq: u64,
    last_height: Option<i64>,
}

impl MessageQueue {
    /// Creates a queue holding a single empty placeholder.
    pub fn new(from: BtpAddress) -> Self {
        let mut queue = Self {
            entries: VecDeque::new(),
            from,
            next_seq: 0,
            last_height: None,
        };
        queue.push_empty();
        queue
    }

    fn push_empty(&mut self) -> &mut RelayMessage {
        let rm = RelayMessage::new(self.next_seq, self.from.clone());
        self.next_seq += 1;
        self.entries.push_back(rm);
        self.entries.back_mut().expect("just pushed")
    }

    fn tail_mut(&mut self) -> &mut RelayMessage {
        self.entries.back_mut().expect("queue is never empty")
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A queue always holds at least a placeholder.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates entries head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &RelayMessage> {
        self.entries.iter()
    }

    /// Iterates entries head to tail, mutably.
    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut RelayMessage> {
        self.entries.iter_mut()
    }
}

/// Ingests one source block update and its receipt proofs.
///
/// Block updates must arrive in strict ascending height order with no gaps;
/// a gap is fatal. Updates at or below the verifier height carry nothing new
/// and are dropped unless they bear receipt proofs.
pub fn add_relay_message(
    queue: &mut MessageQueue,
    block_update: BlockUpdate,
    receipt_proofs: Vec<ReceiptProof>,
    verifier_height: i64,
    height_of_dst: i64,
) -> Result<()> {
    if let Some(last) = queue.last_height {
        if last + 1 != block_update.height {
            return Err(Error::InvalidBlockUpdateHeight {
                last,
                got: block_update.height,
            });
        }
    }
    queue.last_height = Some(block_update.height);

    if !queue.tail_mut().segments.is_empty() {
        queue.push_empty();
    }
    if !receipt_proofs.is_empty() {
        let height = block_update.height;
        let tail = queue.tail_mut();
        tail.block_updates.push(block_update);
        tail.receipt_proofs = receipt_proofs;
        tail.height_of_dst = height_of_dst;
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Queue,
            entries = queue.len(),
            bu = height,
            "ingested block update with receipt proofs",
        );
        // receipt-bearing entries are sealed; the next update starts fresh
        queue.push_empty();
    } else if block_update.height > verifier_height {
        let height = block_update.height;
        let tail = queue.tail_mut();
        tail.block_updates.push(block_update);
        let from = tail.block_updates[0].height;
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Queue,
            entries = queue.len(),
            from,
            to = height,
            "ingested block update",
        );
    }
    Ok(())
}

/// Prunes delivered content after the destination acknowledged verifier
/// height `h` and event sequence `seq`.
///
/// `new_block_proof` synthesizes a proof for `(height, header)` against the
/// destination's current accumulator view; it is invoked both to refresh
/// stale block proofs and to promote fully-covered block updates whose
/// receipt proofs are still undelivered.
///
/// Idempotent and monotone: re-applying the same `(h, seq)` is a no-op.
pub fn update_relay_message(
    queue: &mut MessageQueue,
    h: i64,
    seq: u64,
    new_block_proof: &mut dyn FnMut(i64, &[u8]) -> Result<BlockProof>,
) -> Result<()> {
    let mut removed = 0;
    'walk: for (i, rm) in queue.entries.iter_mut().enumerate() {
        if !rm.receipt_proofs.is_empty() {
            let mut delivered = 0;
            for (j, rp) in rm.receipt_proofs.iter_mut().enumerate() {
                let Some(first) = rp.events.first() else {
                    delivered = j + 1;
                    continue;
                };
                if seq < first.sequence {
                    // nothing here is consumed yet, nor in any later entry
                    break 'walk;
                }
                let consumed = (seq - first.sequence + 1) as usize;
                if consumed >= rp.events.len() {
                    delivered = j + 1;
                } else {
                    tracing::debug!(
                        target: probe::TARGET,
                        kind = %probe::Kind::Queue,
                        rm = rm.seq,
                        rp = rp.index,
                        from = %rp.events[0].sequence,
                        to = %rp.events[consumed - 1].sequence,
                        "removing delivered event proofs",
                    );
                    rp.events.drain(..consumed);
                    if !rp.event_proofs.is_empty() {
                        rp.event_proofs.drain(..consumed);
                    }
                }
            }
            if delivered > 0 {
                tracing::debug!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Queue,
                    rm = rm.seq,
                    count = delivered,
                    "removing delivered receipt proofs",
                );
                rm.receipt_proofs.drain(..delivered);
            }
        }

        if rm.block_proof.is_some() {
            if rm.receipt_proofs.is_empty() {
                // proof delivered and no receipts left to justify the entry
                removed = i + 1;
            } else {
                // the witness must match the destination's current view
                let (height, header) = {
                    let bp = rm.block_proof.as_ref().expect("checked");
                    (bp.height, bp.header.clone())
                };
                rm.block_proof = Some(new_block_proof(height, &header)?);
            }
        }

        if !rm.block_updates.is_empty() {
            let first_height = rm.block_updates[0].height;
            if h < first_height {
                break 'walk;
            }
            let covered = (h - first_height + 1) as usize;
            if covered >= rm.block_updates.len() {
                if !rm.receipt_proofs.is_empty() {
                    let last = rm
                        .block_updates
                        .last()
                        .expect("checked non-empty");
                    rm.block_proof =
                        Some(new_block_proof(last.height, &last.header)?);
                    rm.block_updates.clear();
                } else {
                    removed = i + 1;
                }
            } else {
                tracing::debug!(
                    target: probe::TARGET,
                    kind = %probe::Kind::Queue,
                    rm = rm.seq,
                    from = first_height,
                    to = rm.block_updates[covered - 1].height,
                    "removing covered block updates",
                );
                rm.block_updates.drain(..covered);
            }
        }
    }

    if removed > 0 {
        tracing::debug!(
            target: probe::TARGET,
            kind = %probe::Kind::Queue,
            count = removed,
            "removing delivered relay messages",
        );
        queue.entries.drain(..removed);
        if queue.entries.is_empty() {
            queue.push_empty();
        }
    }
    Ok(())
}
