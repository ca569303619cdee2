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
//! # Relayer MTA Module
//!
//! An append-only Merkle Tree Accumulator over source-chain block hashes.
//!
//! The accumulator keeps one perfect binary tree per set bit of its length
//! (a binary counter of roots). Leaves and the root state are persisted in
//! the store bucket named [`ACCUMULATOR_BUCKET`]; witnesses for historical
//! blocks are regenerated from the persisted leaves.

use alloy_rlp::{RlpDecodable, RlpEncodable};
use bytes::Bytes;
use sha3::{Digest, Sha3_256};

use btp_relayer_store::SledStore;
use btp_relayer_utils::{Error, Result};

/// Bucket holding the accumulator state and its leaves.
pub const ACCUMULATOR_BUCKET: &str = "Accumulator";
/// Key of the accumulator state blob inside the bucket.
const STATE_KEY: &[u8] = b"Accumulator";

/// A node or leaf hash.
pub type Hash = Vec<u8>;

#[derive(Debug, Default, RlpEncodable, RlpDecodable)]
struct AccumulatorState {
    offset: u64,
    height: u64,
    // one slot per level; empty bytes mark a vacant slot
    roots: Vec<Bytes>,
}

fn parent_hash(left: &[u8], right: &[u8]) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

fn height_key(height: i64) -> [u8; 8] {
    (height as u64).to_be_bytes()
}

/// Append-only accumulator with persisted state and witness generation.
pub struct ExtAccumulator {
    tree: sled::Tree,
    offset: i64,
    height: i64,
    roots: Vec<Option<Hash>>,
    // leaves appended since the last flush, ascending by height
    pending: Vec<(i64, Hash)>,
}

impl std::fmt::Debug for ExtAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtAccumulator")
            .field("offset", &self.offset)
            .field("height", &self.height)
            .finish()
    }
}

impl ExtAccumulator {
    /// Opens the accumulator from the store.
    ///
    /// When a persisted state exists its offset and height are recovered and
    /// the configured `offset` is ignored; otherwise `offset` seeds a fresh
    /// accumulator.
    pub fn open(store: &SledStore, offset: i64) -> Result<Self> {
        let tree = store.bucket(ACCUMULATOR_BUCKET)?;
        let offset = offset.max(0);
        let mut acc = Self {
            tree,
            offset,
            height: offset,
            roots: Vec::new(),
            pending: Vec::new(),
        };
        if acc.tree.contains_key(STATE_KEY)? {
            acc.recover()?;
            if acc.offset != offset {
                tracing::warn!(
                    recovered = acc.offset,
                    configured = offset,
                    "configured accumulator offset ignored in favor of recovered state",
                );
            }
            tracing::debug!(
                offset = acc.offset,
                height = acc.height,
                "recovered accumulator",
            );
        }
        Ok(acc)
    }

    fn recover(&mut self) -> Result<()> {
        let raw = self
            .tree
            .get(STATE_KEY)?
            .ok_or(Error::Generic("accumulator state vanished"))?;
        let state: AccumulatorState = alloy_rlp::Decodable::decode(&mut raw.as_ref())?;
        self.offset = state.offset as i64;
        self.height = state.height as i64;
        self.roots = state
            .roots
            .into_iter()
            .map(|r| (!r.is_empty()).then(|| r.to_vec()))
            .collect();
        Ok(())
    }

    /// Height of the block before the first accumulated one.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Height of the last accumulated block.
    pub fn height(&self) -> i64 {
        self.height
    }

    /// Number of accumulated leaves.
    pub fn len(&self) -> i64 {
        self.height - self.offset
    }

    /// Whether the accumulator holds no leaves yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the next block hash.
    pub fn add_hash(&mut self, hash: Hash) {
        self.height += 1;
        self.pending.push((self.height, hash.clone()));
        let mut carry = hash;
        for slot in self.roots.iter_mut() {
            match slot.take() {
                None => {
                    *slot = Some(carry);
                    return;
                }
                Some(left) => carry = parent_hash(&left, &carry),
            }
        }
        self.roots.push(Some(carry));
    }

    /// Persists appended leaves and the root state.
    pub fn flush(&mut self) -> Result<()> {
        for (height, leaf) in &self.pending {
            self.tree.insert(height_key(*height), leaf.as_slice())?;
        }
        let state = AccumulatorState {
            offset: self.offset as u64,
            height: self.height as u64,
            roots: self
                .roots
                .iter()
                .map(|r| Bytes::from(r.clone().unwrap_or_default()))
                .collect(),
        };
        self.tree.insert(STATE_KEY, alloy_rlp::encode(&state))?;
        self.tree.flush()?;
        self.pending.clear();
        Ok(())
    }

    fn leaf(&self, height: i64) -> Result<Hash> {
        if let Some((_, leaf)) =
            self.pending.iter().find(|(h, _)| *h == height)
        {
            return Ok(leaf.clone());
        }
        self.tree
            .get(height_key(height))?
            .map(|v| v.to_vec())
            .ok_or(Error::MissingAccumulatorLeaf(height))
    }

    fn subtree_root(&self, start: u64, size: u64, offset: i64) -> Result<Hash> {
        if size == 1 {
            return self.leaf(offset + start as i64 + 1);
        }
        let half = size / 2;
        let left = self.subtree_root(start, half, offset)?;
        let right = self.subtree_root(start + half, half, offset)?;
        Ok(parent_hash(&left, &right))
    }

    /// Produces the witness proving the block at `height` against the
    /// accumulator view of `offset` + `at`. `at` is clamped to the
    /// accumulated height; the effective value is returned with the
    /// leaf-to-root sibling hashes.
    pub fn witness_for_at(
        &self,
        height: i64,
        at: i64,
        offset: i64,
    ) -> Result<(i64, Vec<Hash>)> {
        let at = at.min(self.height);
        if height <= offset || height > at {
            return Err(Error::WitnessOutOfRange { height, offset, at });
        }
        let leaves = (at - offset) as u64;
        let idx = (height - offset - 1) as u64;

        // locate the perfect subtree covering `idx` in the forest
        // decomposition of `leaves`
        let mut start = 0u64;
        let mut size = 0u64;
        for bit in (0..u64::BITS).rev() {
            let s = 1u64 << bit;
            if leaves & s != 0 {
                if idx < start + s {
                    size = s;
                    break;
                }
                start += s;
            }
        }

        let mut witness = Vec::new();
        let mut lo = start;
        let mut span = size;
        while span > 1 {
            let half = span / 2;
            if idx < lo + half {
                witness.push(self.subtree_root(lo + half, half, offset)?);
            } else {
                witness.push(self.subtree_root(lo, half, offset)?);
                lo += half;
            }
            span = half;
        }
        witness.reverse();
        Ok((at, witness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_hash(i: u8) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update([i]);
        hasher.finalize().to_vec()
    }

    fn accumulator_with(store: &SledStore, offset: i64, n: u8) -> ExtAccumulator {
        let mut acc = ExtAccumulator::open(store, offset).unwrap();
        for i in 0..n {
            acc.add_hash(leaf_hash(i));
        }
        acc.flush().unwrap();
        acc
    }

    // replays the witness from the leaf; `idx` is the leaf position within
    // its perfect subtree
    fn apply_witness(leaf: Hash, mut idx: u64, witness: &[Hash]) -> Hash {
        let mut node = leaf;
        for w in witness {
            node = if idx & 1 == 0 {
                parent_hash(&node, w)
            } else {
                parent_hash(w, &node)
            };
            idx >>= 1;
        }
        node
    }

    #[test]
    fn height_tracks_appends() {
        let store = SledStore::temporary().unwrap();
        let acc = accumulator_with(&store, 5, 12);
        assert_eq!(acc.offset(), 5);
        assert_eq!(acc.height(), 17);
        assert_eq!(acc.len(), 12);
    }

    #[test]
    fn witnesses_verify_against_their_subtree_roots() {
        let store = SledStore::temporary().unwrap();
        let n = 13u8; // forest 8 + 4 + 1
        let acc = accumulator_with(&store, 0, n);
        for height in 1..=n as i64 {
            let (at, witness) =
                acc.witness_for_at(height, n as i64, 0).unwrap();
            assert_eq!(at, n as i64);

            // independently locate the subtree for the leaf
            let idx = (height - 1) as u64;
            let (mut start, mut size) = (0u64, 0u64);
            for bit in (0..u64::BITS).rev() {
                let s = 1u64 << bit;
                if (n as u64) & s != 0 {
                    if idx < start + s {
                        size = s;
                        break;
                    }
                    start += s;
                }
            }
            assert_eq!(witness.len() as u32, size.trailing_zeros());
            let root = apply_witness(
                acc.leaf(height).unwrap(),
                idx - start,
                &witness,
            );
            assert_eq!(root, acc.subtree_root(start, size, 0).unwrap());
        }
    }

    #[test]
    fn witness_view_is_clamped_to_accumulated_height() {
        let store = SledStore::temporary().unwrap();
        let acc = accumulator_with(&store, 0, 8);
        let (at, _) = acc.witness_for_at(3, 20, 0).unwrap();
        assert_eq!(at, 8);
    }

    #[test]
    fn out_of_range_heights_error() {
        let store = SledStore::temporary().unwrap();
        let acc = accumulator_with(&store, 2, 4);
        assert!(matches!(
            acc.witness_for_at(2, 6, 2),
            Err(Error::WitnessOutOfRange { .. })
        ));
        assert!(matches!(
            acc.witness_for_at(7, 6, 2),
            Err(Error::WitnessOutOfRange { .. })
        ));
    }

    #[test]
    fn recovery_wins_over_configured_offset() {
        let store = SledStore::temporary().unwrap();
        {
            let _acc = accumulator_with(&store, 10, 6);
        }
        let acc = ExtAccumulator::open(&store, 99).unwrap();
        assert_eq!(acc.offset(), 10);
        assert_eq!(acc.height(), 16);

        // appending continues seamlessly after recovery
        let mut acc = acc;
        acc.add_hash(leaf_hash(200));
        assert_eq!(acc.height(), 17);
    }

    #[test]
    fn unflushed_leaves_are_visible_to_witnesses() {
        let store = SledStore::temporary().unwrap();
        let mut acc = ExtAccumulator::open(&store, 0).unwrap();
        for i in 0..4 {
            acc.add_hash(leaf_hash(i));
        }
        // no flush yet
        let (at, witness) = acc.witness_for_at(2, 4, 0).unwrap();
        assert_eq!(at, 4);
        assert_eq!(witness.len(), 2);
    }
}
