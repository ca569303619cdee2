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

use bytes::Bytes;

use btp_relayer_types::wire::{
    self, BlockProofWire, ReceiptProofWire, RelayMessageWire,
};
use btp_relayer_types::{BlockProof, RelayMessage, Segment};
use btp_relayer_utils::{Error, Result};

// packing state for the message being assembled
#[derive(Default)]
struct Packing {
    msg: RelayMessageWire,
    height: i64,
    number_of_block_update: usize,
    event_sequence: u64,
    number_of_event: usize,
}

impl Packing {
    fn with_block_proof(block_proof: Bytes) -> Self {
        Self {
            msg: RelayMessageWire {
                block_proof,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn finalize(self) -> Arc<Segment> {
        Arc::new(Segment::new(
            self.height,
            self.number_of_block_update,
            self.event_sequence,
            self.number_of_event,
            wire::encode(&self.msg),
        ))
    }
}

/// Packs a relay message into segments whose encoded form respects the
/// destination's transaction size limit.
///
/// Block updates at or below `verifier_height` carry nothing new and are
/// skipped; once a message holds receipt proofs but no block updates the
/// block proof rides along so every segment remains independently
/// verifiable.
pub fn segment(
    rm: &RelayMessage,
    verifier_height: i64,
    limit: usize,
) -> Result<Vec<Arc<Segment>>> {
    let mut segments = Vec::new();
    let mut packing = Packing::default();
    let mut size = 0usize;

    for bu in &rm.block_updates {
        if bu.height <= verifier_height {
            continue;
        }
        let bu_size = bu.proof.len();
        if bu_size > limit {
            return Err(Error::InvalidBlockUpdateSize {
                size: bu_size,
                limit,
            });
        }
        size += bu_size;
        if size > limit {
            segments.push(std::mem::take(&mut packing).finalize());
            size = bu_size;
        }
        packing
            .msg
            .block_updates
            .push(Bytes::from(bu.proof.clone()));
        packing.height = bu.height;
        packing.number_of_block_update += 1;
    }

    let bp_bytes: Bytes = match &rm.block_proof {
        Some(bp) => Bytes::from(wire::encode(&BlockProofWire::from(bp))),
        None => Bytes::new(),
    };
    if bp_bytes.len() > limit {
        return Err(Error::InvalidBlockProofSize {
            size: bp_bytes.len(),
            limit,
        });
    }

    for rp in &rm.receipt_proofs {
        if rp.proof.len() > limit {
            return Err(Error::InvalidReceiptProofSize {
                size: rp.proof.len(),
                limit,
            });
        }
        if packing.msg.block_updates.is_empty() {
            size += bp_bytes.len();
            packing.msg.block_proof = bp_bytes.clone();
            if let Some(bp) = &rm.block_proof {
                packing.height = bp.block_witness.height;
            }
        }
        size += rp.proof.len();
        let mut trp = ReceiptProofWire {
            index: rp.index as u64,
            proof: Bytes::from(rp.proof.clone()),
            event_proofs: Vec::new(),
        };
        for (j, ep) in rp.event_proofs.iter().enumerate() {
            if ep.len() > limit {
                return Err(Error::InvalidEventProofSize {
                    size: ep.len(),
                    limit,
                });
            }
            size += ep.len();
            if size > limit {
                if j == 0 && packing.msg.block_updates.is_empty() {
                    return Err(Error::OversizedProofBundle { limit });
                }
                // carry the events packed so far into the closing segment
                if !trp.event_proofs.is_empty() {
                    packing
                        .msg
                        .receipt_proofs
                        .push(Bytes::from(wire::encode(&trp)));
                }
                segments.push(packing.finalize());

                packing = Packing::with_block_proof(bp_bytes.clone());
                size = ep.len() + rp.proof.len() + bp_bytes.len();
                trp = ReceiptProofWire {
                    index: rp.index as u64,
                    proof: Bytes::from(rp.proof.clone()),
                    event_proofs: Vec::new(),
                };
            }
            trp.event_proofs.push(Bytes::from(ep.clone()));
            packing.event_sequence = rp.events[j].sequence;
            packing.number_of_event += 1;
        }
        packing
            .msg
            .receipt_proofs
            .push(Bytes::from(wire::encode(&trp)));
    }

    segments.push(packing.finalize());
    Ok(segments)
}

/// Re-encodes an already-built segment with a replacement block proof.
pub fn update_segment(
    block_proof: &BlockProof,
    segment: &Segment,
) -> Result<()> {
    let mut msg: RelayMessageWire = wire::decode(&segment.transaction_param())?;
    msg.block_proof =
        Bytes::from(wire::encode(&BlockProofWire::from(block_proof)));
    segment.set_transaction_param(wire::encode(&msg));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use btp_relayer_types::{
        BlockUpdate, BlockWitness, Event, ReceiptProof,
    };

    const LIMIT: usize = 1024;

    fn bu(height: i64, proof_len: usize) -> BlockUpdate {
        BlockUpdate {
            height,
            block_hash: vec![height as u8; 32],
            header: vec![height as u8; 8],
            proof: vec![height as u8; proof_len],
        }
    }

    fn rm_with_updates(updates: Vec<BlockUpdate>) -> RelayMessage {
        RelayMessage {
            block_updates: updates,
            ..Default::default()
        }
    }

    fn rp_with_events(count: u64, proof_len: usize) -> ReceiptProof {
        ReceiptProof {
            index: 0,
            proof: vec![0xaa; 16],
            events: (1..=count)
                .map(|sequence| Event {
                    sequence,
                    next: String::new(),
                    message: vec![],
                })
                .collect(),
            event_proofs: (1..=count).map(|s| vec![s as u8; proof_len]).collect(),
        }
    }

    fn block_proof() -> BlockProof {
        BlockProof {
            height: 3,
            header: vec![3u8; 8],
            block_witness: BlockWitness {
                height: 10,
                witness: vec![vec![0u8; 32]],
            },
        }
    }

    fn decoded(segments: &[Arc<Segment>]) -> Vec<RelayMessageWire> {
        segments
            .iter()
            .map(|s| wire::decode(&s.transaction_param()).unwrap())
            .collect()
    }

    #[test]
    fn packs_small_updates_into_one_segment() {
        let rm = rm_with_updates((1..=5).map(|h| bu(h, 16)).collect());
        let segments = segment(&rm, 0, LIMIT).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].number_of_block_update, 5);
        assert_eq!(segments[0].height, 5);
        let msgs = decoded(&segments);
        assert_eq!(msgs[0].block_updates.len(), 5);
    }

    #[test]
    fn skips_updates_at_or_below_the_verifier_height() {
        let rm = rm_with_updates((1..=6).map(|h| bu(h, 16)).collect());
        let segments = segment(&rm, 4, LIMIT).unwrap();
        let msgs = decoded(&segments);
        assert_eq!(msgs[0].block_updates.len(), 2);
        assert_eq!(segments[0].height, 6);
    }

    #[test]
    fn splits_when_updates_exceed_the_limit() {
        // 5 proofs of 300 bytes: 3 fit, the 4th overflows
        let rm = rm_with_updates((1..=5).map(|h| bu(h, 300)).collect());
        let segments = segment(&rm, 0, LIMIT).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].number_of_block_update, 3);
        assert_eq!(segments[1].number_of_block_update, 2);
        let total: usize = decoded(&segments)
            .iter()
            .map(|m| m.block_updates.len())
            .sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn rejects_an_oversized_block_update() {
        let rm = rm_with_updates(vec![bu(1, LIMIT + 1)]);
        assert!(matches!(
            segment(&rm, 0, LIMIT),
            Err(Error::InvalidBlockUpdateSize { .. })
        ));
    }

    #[test]
    fn events_split_across_segments_with_monotone_sequences() {
        // 20 event proofs of 100 bytes against a 1024 limit
        let rm = RelayMessage {
            block_proof: Some(block_proof()),
            receipt_proofs: vec![rp_with_events(20, 100)],
            ..Default::default()
        };
        let segments = segment(&rm, 0, LIMIT).unwrap();
        assert!(segments.len() >= 2);

        let total_events: usize =
            segments.iter().map(|s| s.number_of_event).sum();
        assert_eq!(total_events, 20);

        let mut last = 0u64;
        for s in &segments {
            assert!(s.event_sequence > last);
            last = s.event_sequence;
        }
        assert_eq!(last, 20);

        // every segment carries the block proof and its share of the events
        let mut carried = 0;
        for msg in decoded(&segments) {
            assert!(!msg.block_proof.is_empty());
            for raw in &msg.receipt_proofs {
                let rp: ReceiptProofWire = wire::decode(raw).unwrap();
                carried += rp.event_proofs.len();
            }
        }
        assert_eq!(carried, 20);
    }

    #[test]
    fn encoded_segments_respect_the_size_limit() {
        let cases = vec![
            rm_with_updates((1..=30).map(|h| bu(h, 120)).collect()),
            RelayMessage {
                block_proof: Some(block_proof()),
                receipt_proofs: vec![rp_with_events(20, 100)],
                ..Default::default()
            },
            RelayMessage {
                block_updates: (1..=10).map(|h| bu(h, 200)).collect(),
                receipt_proofs: vec![rp_with_events(8, 90)],
                block_proof: Some(block_proof()),
                ..Default::default()
            },
        ];
        for rm in cases {
            for s in segment(&rm, 0, LIMIT).unwrap() {
                assert!(
                    s.transaction_param().len() <= LIMIT,
                    "segment of {} bytes exceeds {LIMIT}",
                    s.transaction_param().len(),
                );
            }
        }
    }

    #[test]
    fn oversized_bundle_of_proofs_is_rejected() {
        let rm = RelayMessage {
            block_proof: Some(block_proof()),
            receipt_proofs: vec![rp_with_events(1, LIMIT - 20)],
            ..Default::default()
        };
        assert!(matches!(
            segment(&rm, 0, LIMIT),
            Err(Error::OversizedProofBundle { .. })
        ));
    }

    #[test]
    fn round_trip_reproduces_all_logical_content() {
        let rm = RelayMessage {
            block_updates: (1..=12).map(|h| bu(h, 150)).collect(),
            receipt_proofs: vec![rp_with_events(9, 80)],
            block_proof: Some(block_proof()),
            ..Default::default()
        };
        let verifier_height = 3;
        let segments = segment(&rm, verifier_height, LIMIT).unwrap();

        let mut updates = Vec::new();
        let mut events = Vec::new();
        for msg in decoded(&segments) {
            updates.extend(msg.block_updates.iter().map(|b| b.to_vec()));
            for raw in &msg.receipt_proofs {
                let rp: ReceiptProofWire = wire::decode(raw).unwrap();
                events.extend(rp.event_proofs.iter().map(|e| e.to_vec()));
            }
        }

        let expected_updates: Vec<Vec<u8>> = rm
            .block_updates
            .iter()
            .filter(|b| b.height > verifier_height)
            .map(|b| b.proof.clone())
            .collect();
        assert_eq!(updates, expected_updates);

        let expected_events: Vec<Vec<u8>> =
            rm.receipt_proofs[0].event_proofs.clone();
        assert_eq!(events, expected_events);
    }

    #[test]
    fn update_segment_swaps_the_block_proof_in_place() {
        let rm = RelayMessage {
            block_proof: Some(block_proof()),
            receipt_proofs: vec![rp_with_events(2, 10)],
            ..Default::default()
        };
        let segments = segment(&rm, 0, LIMIT).unwrap();
        let seg = &segments[0];

        let refreshed = BlockProof {
            height: 3,
            header: vec![3u8; 8],
            block_witness: BlockWitness {
                height: 42,
                witness: vec![vec![7u8; 32]],
            },
        };
        update_segment(&refreshed, seg).unwrap();

        let msg: RelayMessageWire =
            wire::decode(&seg.transaction_param()).unwrap();
        let bp: BlockProofWire = wire::decode(&msg.block_proof).unwrap();
        assert_eq!(bp.block_witness.height, 42);
        // receipt proofs are untouched
        assert_eq!(msg.receipt_proofs.len(), 1);
    }

    #[test]
    fn empty_message_yields_a_single_empty_segment() {
        let rm = RelayMessage::default();
        let segments = segment(&rm, 0, LIMIT).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].number_of_block_update, 0);
        assert_eq!(segments[0].number_of_event, 0);
    }
}
