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

use btp_relayer_chains_icon::{
    Client, HttpTransport, IconReceiver, IconSender, KeyWallet,
};
use btp_relayer_config::BtpRelayerConfig;
use btp_relayer_link::RelayLink;
use btp_relayer_store::SledStore;
use btp_relayer_utils::{probe, Error, Result};

/// Builds the relay link for the configured link and runs it until the
/// first unrecoverable error.
pub async fn ignite(config: &BtpRelayerConfig, store: SledStore) -> Result<()> {
    let link_config = &config.relay;
    let src = link_config.src.address.clone();
    let dst = link_config.dst.address.clone();

    let secret = link_config
        .dst
        .secret
        .as_deref()
        .ok_or(Error::Generic("missing relay secret in the config"))?;
    let wallet = Arc::new(KeyWallet::from_secret_hex(secret)?);

    let sender = Arc::new(IconSender::new(
        Client::new(HttpTransport::new(&link_config.dst.endpoint)?),
        src.clone(),
        dst.clone(),
        wallet,
        &link_config.dst.options,
    ));
    let receiver = Arc::new(IconReceiver::new(
        Client::new(HttpTransport::new(&link_config.src.endpoint)?),
        src.clone(),
        dst.clone(),
    ));

    let link = RelayLink::new(src, dst, sender, &store, link_config.offset)?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::INFO,
        kind = %probe::Kind::Lifecycle,
        src = %link.src(),
        dst = %link.dst(),
        accumulator_height = link.accumulator_height(),
        "relay link ready",
    );
    link.serve(receiver).await
}
