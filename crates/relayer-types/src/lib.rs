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
//! # Relayer Types Module
//!
//! Core data model shared by every crate of the BTP relayer: BTP network
//! addresses, the relay message queue entries the pipeline mutates, the
//! byte-bounded segments it submits, and the deterministic wire encoding the
//! destination BMC consumes.

use std::sync::Arc;

/// BTP network address (`btp://<net>/<account>`).
pub mod btp_address;
/// Byte-bounded slice of a relay message plus its submission state.
pub mod segment;
/// Destination BMC link status and contract revert codes.
pub mod status;
/// RLP wire representation of relay messages and proofs.
pub mod wire;

pub use btp_address::BtpAddress;
pub use segment::{Segment, TransactionResult, TxHash};
pub use status::{BmcLinkStatus, RevertCode, VerifierStatus};

/// A verified source-chain block header bundle produced by the Receiver.
///
/// `proof` is the opaque blob the on-chain verifier consumes; the relay never
/// looks inside it, it only packs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUpdate {
    /// Source chain height of this update.
    pub height: i64,
    /// Hash of the block, appended to the accumulator.
    pub block_hash: Vec<u8>,
    /// Serialized header, kept for later block proof synthesis.
    pub header: Vec<u8>,
    /// Verifier input blob.
    pub proof: Vec<u8>,
}

/// A single BTP event carried by a receipt proof.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Strictly increasing per-link sequence number.
    pub sequence: u64,
    /// Next-hop BTP address the message is routed to.
    pub next: String,
    /// Opaque event payload.
    pub message: Vec<u8>,
}

/// Proof of a receipt and the BTP events it emitted.
///
/// `events` and `event_proofs` are index-aligned; pruning slices both
/// symmetrically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptProof {
    /// Receipt index within its block.
    pub index: usize,
    /// Inclusion proof of the receipt.
    pub proof: Vec<u8>,
    /// Events emitted by the receipt, ascending by sequence.
    pub events: Vec<Event>,
    /// Per-event inclusion proofs, aligned with `events`.
    pub event_proofs: Vec<Vec<u8>>,
}

/// Accumulator witness for one historical block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockWitness {
    /// Accumulator height the witness was generated at.
    pub height: i64,
    /// Leaf-to-root sibling hashes.
    pub witness: Vec<Vec<u8>>,
}

/// Inclusion proof of a block in the accumulator, synthesized when queued
/// block updates become redundant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockProof {
    /// Height of the proven block. Kept so the proof can be re-synthesized
    /// against a newer verifier view.
    pub height: i64,
    /// Serialized header of the proven block (owned copy, never aliased).
    pub header: Vec<u8>,
    /// The witness set.
    pub block_witness: BlockWitness,
}

/// One entry of the relay message queue.
///
/// Only the tail entry is mutated by ingestion; earlier entries are immutable
/// with respect to `block_updates` / `receipt_proofs` content except for
/// in-place shrinking by the pruning pass. `segments` belong to the
/// dispatcher.
#[derive(Debug, Clone, Default)]
pub struct RelayMessage {
    /// Process-local monotonically increasing id.
    pub seq: u64,
    /// Source link address.
    pub from: BtpAddress,
    /// Height-contiguous ascending block updates.
    pub block_updates: Vec<BlockUpdate>,
    /// Replacement proof once the block updates were promoted.
    pub block_proof: Option<BlockProof>,
    /// Receipt proofs generated by the last block update.
    pub receipt_proofs: Vec<ReceiptProof>,
    /// Destination height observed when the receipt proofs were attached.
    pub height_of_dst: i64,
    /// Packed segments, assigned lazily by the dispatcher.
    pub segments: Vec<Arc<Segment>>,
}

impl RelayMessage {
    /// Creates an empty queue entry.
    pub fn new(seq: u64, from: BtpAddress) -> Self {
        Self {
            seq,
            from,
            ..Default::default()
        }
    }

    /// Whether any segment has been submitted but has no result yet.
    pub fn has_wait(&self) -> bool {
        self.segments.iter().any(|s| s.is_awaiting_result())
    }
}
