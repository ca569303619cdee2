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

//! # Relayer Configuration Module
//!
//! A module for configuring the relayer. Configuration is loaded from
//! `*.toml` / `*.json` files in a directory, with environment overrides under
//! the `BTP` prefix.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Utils for processing configuration
pub mod utils;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use btp_relayer_types::BtpAddress;

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

/// BtpRelayerConfig is the configuration for the BTP relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BtpRelayerConfig {
    /// Base directory for the relayer's persistent state.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// The single directed link this instance relays.
    pub relay: LinkConfig,
}

impl BtpRelayerConfig {
    /// Where the accumulator database lives:
    /// `<base_dir>/<destination network address>/db`.
    pub fn db_path(&self) -> PathBuf {
        self.base_dir
            .join(self.relay.dst.address.network_address())
            .join("db")
    }

    /// `base_dir`, resolved against `root` when relative.
    pub fn abs_base_dir<P: AsRef<Path>>(&self, root: P) -> PathBuf {
        if self.base_dir.is_absolute() {
            self.base_dir.clone()
        } else {
            root.as_ref().join(&self.base_dir)
        }
    }
}

/// One directed source→destination link.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkConfig {
    /// The source chain.
    pub src: ChainConfig,
    /// The destination chain.
    pub dst: ChainConfig,
    /// Accumulator offset used when no persisted state exists yet.
    #[serde(default)]
    pub offset: i64,
}

/// Connection details of one chain endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// BTP address of the BMC on this chain.
    pub address: BtpAddress,
    /// JSON-RPC endpoint.
    pub endpoint: String,
    /// Hex-encoded relay key (destination side only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Chain-specific options (step limit, polling interval, ...).
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}
