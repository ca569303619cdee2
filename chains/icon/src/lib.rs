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
//! # ICON Chain Adapter
//!
//! The destination-side [`Sender`](btp_relayer_chain_traits::Sender)
//! implementation for ICON: a JSON-RPC client, a secp256k1 wallet, relay
//! message submission with fragmentation, result polling and the BMC status
//! query. A polling [`Receiver`](btp_relayer_chain_traits::Receiver) for
//! ICON sources lives here too.

/// JSON-RPC transport and the typed ICON client.
pub mod client;
/// Source-side block polling.
pub mod receiver;
/// Destination-side Sender adapter.
pub mod sender;
/// Transaction signing.
pub mod wallet;

pub use client::{Client, HttpTransport, RpcTransport};
pub use receiver::IconReceiver;
pub use sender::IconSender;
pub use wallet::{KeyWallet, Wallet};
