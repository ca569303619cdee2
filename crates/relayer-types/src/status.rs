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

use derive_more::Display;

/// BMC revert code range start.
const BMC_REVERT_BASE: u32 = 10;
/// BMV revert code range start.
const BMV_REVERT_BASE: u32 = 25;

/// Typed revert codes surfaced by the destination BMC/BMV contracts.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevertCode {
    /// Caller is not an authorized relay of the link.
    #[display(fmt = "BMCRevertUnauthorized")]
    BmcRevertUnauthorized,
    /// Verifier rejected the message for an unclassified reason.
    #[display(fmt = "BMVUnknown")]
    BmvUnknown,
    /// Proofs do not connect to the verifier's current state.
    #[display(fmt = "BMVNotVerifiable")]
    BmvNotVerifiable,
    /// The verifier already accepted the covered heights.
    #[display(fmt = "BMVAlreadyVerified")]
    BmvAlreadyVerified,
    /// Any other contract revert.
    #[display(fmt = "Revert({})", _0)]
    Other(u32),
}

impl RevertCode {
    /// Decodes an on-chain revert code.
    pub fn from_code(code: u32) -> Self {
        match code {
            c if c == BMC_REVERT_BASE + 1 => Self::BmcRevertUnauthorized,
            c if c == BMV_REVERT_BASE => Self::BmvUnknown,
            c if c == BMV_REVERT_BASE + 1 => Self::BmvNotVerifiable,
            c if c == BMV_REVERT_BASE + 2 => Self::BmvAlreadyVerified,
            other => Self::Other(other),
        }
    }

    /// The on-chain code value.
    pub fn code(&self) -> u32 {
        match self {
            Self::BmcRevertUnauthorized => BMC_REVERT_BASE + 1,
            Self::BmvUnknown => BMV_REVERT_BASE,
            Self::BmvNotVerifiable => BMV_REVERT_BASE + 1,
            Self::BmvAlreadyVerified => BMV_REVERT_BASE + 2,
            Self::Other(code) => *code,
        }
    }
}

/// Destination verifier state, with the fields decoded out of `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierStatus {
    /// Highest source height the verifier accepted.
    pub height: i64,
    /// Raw extra blob as returned by the contract.
    pub extra: Vec<u8>,
    /// Accumulator offset, decoded from `extra`.
    pub offset: i64,
    /// Last relayed source height, decoded from `extra`.
    pub last_height: i64,
}

/// Link status queried from the destination BMC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BmcLinkStatus {
    /// Outbound message sequence.
    pub tx_seq: u64,
    /// Highest event sequence consumed from this link.
    pub rx_seq: u64,
    /// Verifier state.
    pub verifier: VerifierStatus,
    /// Current destination height.
    pub current_height: i64,
}
