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

//! # Relayer Utils Module
//!
//! Shared error type, retry policies and structured log probes.

use btp_relayer_types::RevertCode;

/// A module used for debugging relayer lifecycle, sync state, or other
/// relayer state.
pub mod probe;
/// Retry functionality.
pub mod retry;

/// An enum of all possible errors that could be encountered during the
/// execution of the BTP relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Reqwest error.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Wire codec error.
    #[error("rlp codec error: {0}")]
    Codec(alloy_rlp::Error),
    /// Error while parsing the config files.
    #[error("config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Malformed BTP address.
    #[error("invalid BTP address: {0}")]
    InvalidBtpAddress(String),
    /// The source delivered a block past the next accumulator height.
    #[error("missing block, accumulator expects {expected} got {got}")]
    MissingBlock {
        /// Next height the accumulator expects.
        expected: i64,
        /// Height actually delivered.
        got: i64,
    },
    /// The source delivered a non-contiguous block update.
    #[error("invalid block update height, last {last} got {got}")]
    InvalidBlockUpdateHeight {
        /// Height of the previously ingested update.
        last: i64,
        /// Height actually delivered.
        got: i64,
    },
    /// A single block update proof exceeds the transaction size limit.
    #[error("block update proof of {size} bytes exceeds tx limit {limit}")]
    InvalidBlockUpdateSize {
        /// Proof size in bytes.
        size: usize,
        /// Transaction size limit.
        limit: usize,
    },
    /// The encoded block proof exceeds the transaction size limit.
    #[error("block proof of {size} bytes exceeds tx limit {limit}")]
    InvalidBlockProofSize {
        /// Encoded proof size in bytes.
        size: usize,
        /// Transaction size limit.
        limit: usize,
    },
    /// A receipt proof exceeds the transaction size limit.
    #[error("receipt proof of {size} bytes exceeds tx limit {limit}")]
    InvalidReceiptProofSize {
        /// Proof size in bytes.
        size: usize,
        /// Transaction size limit.
        limit: usize,
    },
    /// A single event proof exceeds the transaction size limit.
    #[error("event proof of {size} bytes exceeds tx limit {limit}")]
    InvalidEventProofSize {
        /// Proof size in bytes.
        size: usize,
        /// Transaction size limit.
        limit: usize,
    },
    /// Block proof, receipt proof and one event proof cannot share a
    /// transaction.
    #[error("block proof + receipt proof + event proof exceed tx limit {limit}")]
    OversizedProofBundle {
        /// Transaction size limit.
        limit: usize,
    },
    /// A witness was requested outside the accumulator range.
    #[error("witness height {height} out of accumulator range ({offset}, {at}]")]
    WitnessOutOfRange {
        /// Requested block height.
        height: i64,
        /// Accumulator offset.
        offset: i64,
        /// Accumulator height the witness was requested at.
        at: i64,
    },
    /// An accumulator leaf is missing from the store.
    #[error("accumulator leaf at height {0} missing from the store")]
    MissingAccumulatorLeaf(i64),
    /// The destination contract reverted with a typed code.
    #[error("destination revert: {0}")]
    Revert(RevertCode),
    /// A JSON-RPC error response.
    #[error("json-rpc error {code}: {message}")]
    JsonRpc {
        /// RPC error code.
        code: i64,
        /// RPC error message.
        message: String,
    },
    /// Connecting to a chain endpoint failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// Wallet / signing failure.
    #[error("wallet error: {0}")]
    Wallet(String),
    /// A background task failed and stopped abnormally.
    #[error("task stopped abnormally")]
    TaskStoppedAbnormally,
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

impl Error {
    /// The typed destination revert code, if this error carries one.
    pub fn revert_code(&self) -> Option<RevertCode> {
        match self {
            Self::Revert(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<alloy_rlp::Error> for Error {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::Codec(err)
    }
}

/// A type alias for the result for the BTP relayer, that uses the `Error`
/// enum.
pub type Result<T> = std::result::Result<T, Error>;
