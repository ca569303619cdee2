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

//! Deterministic, length-prefixed wire encoding of relay messages.
//!
//! The destination contract consumes RLP; everything else in the relayer
//! treats the codec as `encode`/`decode` over opaque byte blobs.

use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use bytes::Bytes;

use crate::{BlockProof, BlockWitness};

/// Encodes a wire value into its RLP bytes.
pub fn encode<T: Encodable>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode(&mut out);
    out
}

/// Decodes a wire value from its RLP bytes.
pub fn decode<T: Decodable>(mut bytes: &[u8]) -> Result<T, alloy_rlp::Error> {
    T::decode(&mut bytes)
}

/// The relay message as submitted to the BMC: every element is itself an
/// encoded blob. An empty `block_proof` means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct RelayMessageWire {
    /// Verifier inputs, one per packed block update.
    pub block_updates: Vec<Bytes>,
    /// Encoded [`BlockProofWire`], or empty.
    pub block_proof: Bytes,
    /// Encoded [`ReceiptProofWire`]s.
    pub receipt_proofs: Vec<Bytes>,
}

/// Wire form of one receipt proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct ReceiptProofWire {
    /// Receipt index within its block.
    pub index: u64,
    /// Inclusion proof of the receipt.
    pub proof: Bytes,
    /// Per-event inclusion proofs.
    pub event_proofs: Vec<Bytes>,
}

/// Wire form of an accumulator witness.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BlockWitnessWire {
    /// Accumulator height the witness was generated at.
    pub height: u64,
    /// Leaf-to-root sibling hashes.
    pub witness: Vec<Bytes>,
}

/// Wire form of a block proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BlockProofWire {
    /// Serialized header of the proven block.
    pub header: Bytes,
    /// The witness set.
    pub block_witness: BlockWitnessWire,
}

/// Fields the BMC packs into `verifier.extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct VerifierStatusExtra {
    /// Verifier accumulator offset.
    pub offset: u64,
    /// Last relayed source height.
    pub last_height: u64,
}

impl From<&BlockProof> for BlockProofWire {
    fn from(bp: &BlockProof) -> Self {
        Self {
            header: Bytes::from(bp.header.clone()),
            block_witness: BlockWitnessWire {
                height: bp.block_witness.height as u64,
                witness: bp
                    .block_witness
                    .witness
                    .iter()
                    .cloned()
                    .map(Bytes::from)
                    .collect(),
            },
        }
    }
}

impl From<&BlockProofWire> for BlockProof {
    fn from(wire: &BlockProofWire) -> Self {
        Self {
            height: 0,
            header: wire.header.to_vec(),
            block_witness: BlockWitness {
                height: wire.block_witness.height as i64,
                witness: wire
                    .block_witness
                    .witness
                    .iter()
                    .map(|w| w.to_vec())
                    .collect(),
            },
        }
    }
}
