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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A BTP address of the form `btp://<network>/<account>` where `<network>`
/// is `<network id>.<chain>` (for example `btp://0x1.icon/hx1234..`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BtpAddress {
    net: String,
    account: String,
}

impl BtpAddress {
    /// The network address part (`0x1.icon`).
    pub fn network_address(&self) -> &str {
        &self.net
    }

    /// The network id part (`0x1`).
    pub fn network_id(&self) -> &str {
        self.net.split('.').next().unwrap_or(&self.net)
    }

    /// The account part (`hx1234..`).
    pub fn account(&self) -> &str {
        &self.account
    }
}

impl fmt::Display for BtpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "btp://{}/{}", self.net, self.account)
    }
}

impl FromStr for BtpAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("btp://")
            .ok_or_else(|| format!("missing btp:// scheme in {s:?}"))?;
        let (net, account) = rest
            .split_once('/')
            .ok_or_else(|| format!("missing account separator in {s:?}"))?;
        if net.is_empty() || account.is_empty() {
            return Err(format!("empty network or account in {s:?}"));
        }
        Ok(Self {
            net: net.to_owned(),
            account: account.to_owned(),
        })
    }
}

impl Serialize for BtpAddress {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BtpAddress {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
