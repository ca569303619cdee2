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

use parking_lot::Mutex;

/// Submission handle returned by the destination chain for one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TxHash(
    /// Hex-encoded transaction hash.
    pub String,
);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal result of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    /// Hash of the executed transaction.
    pub tx_hash: TxHash,
    /// Destination block the transaction was included in.
    pub block_height: i64,
}

#[derive(Debug, Default)]
struct SegmentState {
    transaction_param: Vec<u8>,
    get_result_param: Option<TxHash>,
    transaction_result: Option<TransactionResult>,
}

/// One byte-bounded slice of a relay message.
///
/// The packing metadata is immutable; the submission state is interior-mutable
/// because detached result tasks settle it while the queue lock is held
/// elsewhere. The dispatcher is the only writer of `get_result_param`.
#[derive(Debug)]
pub struct Segment {
    /// Highest source height covered by this segment.
    pub height: i64,
    /// Number of packed block updates.
    pub number_of_block_update: usize,
    /// Sequence of the last packed event.
    pub event_sequence: u64,
    /// Number of packed event proofs.
    pub number_of_event: usize,
    state: Mutex<SegmentState>,
}

impl Segment {
    /// Creates a segment with its encoded transaction parameter.
    pub fn new(
        height: i64,
        number_of_block_update: usize,
        event_sequence: u64,
        number_of_event: usize,
        transaction_param: Vec<u8>,
    ) -> Self {
        Self {
            height,
            number_of_block_update,
            event_sequence,
            number_of_event,
            state: Mutex::new(SegmentState {
                transaction_param,
                ..Default::default()
            }),
        }
    }

    /// The encoded relay message this segment submits.
    pub fn transaction_param(&self) -> Vec<u8> {
        self.state.lock().transaction_param.clone()
    }

    /// Replaces the encoded relay message (block proof refresh).
    pub fn set_transaction_param(&self, param: Vec<u8>) {
        self.state.lock().transaction_param = param;
    }

    /// The submission handle, if the segment is in flight or delivered.
    pub fn get_result_param(&self) -> Option<TxHash> {
        self.state.lock().get_result_param.clone()
    }

    /// Clears any previous result just before (re)submission.
    pub fn begin_submission(&self) {
        self.state.lock().transaction_result = None;
    }

    /// Records the submission handle.
    pub fn set_get_result_param(&self, param: TxHash) {
        self.state.lock().get_result_param = Some(param);
    }

    /// Drops the submission handle so the next dispatch pass resubmits.
    pub fn clear_get_result_param(&self) {
        self.state.lock().get_result_param = None;
    }

    /// The terminal result, once settled.
    pub fn transaction_result(&self) -> Option<TransactionResult> {
        self.state.lock().transaction_result.clone()
    }

    /// Settles the segment with its terminal result.
    pub fn set_transaction_result(&self, result: TransactionResult) {
        self.state.lock().transaction_result = Some(result);
    }

    /// Submitted but not yet settled.
    pub fn is_awaiting_result(&self) -> bool {
        let state = self.state.lock();
        state.get_result_param.is_some() && state.transaction_result.is_none()
    }
}
