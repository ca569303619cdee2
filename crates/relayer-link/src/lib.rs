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
//! # Relayer Link Module
//!
//! The relay pipeline state machine for one directed source→destination
//! link. It ingests source block updates and receipt proofs, maintains the
//! block hash accumulator, packs proofs into size-bounded segments, submits
//! them through the destination [`Sender`](btp_relayer_chain_traits::Sender)
//! and prunes already-delivered content as destination acknowledgements
//! arrive.

mod link;
/// Relay message queue state and its ingest/prune transitions.
pub mod queue;
/// Byte-bounded packing of relay messages into segments.
pub mod segment;

pub use link::RelayLink;
pub use queue::MessageQueue;

#[cfg(test)]
mod tests;
