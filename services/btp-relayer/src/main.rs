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

//! BTP Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use btp_relayer::service;
use btp_relayer_config::cli::{create_store, load_config, setup_logger, Opts};

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "btp_relayer")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    let config = load_config(args.config_dir.clone())?;
    let store = create_store(&args, &config).await?;

    tokio::select! {
        res = service::ignite(&config, store) => {
            if let Err(err) = res {
                tracing::error!("relay stopped: {err}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Shutting down...");
            tracing::info!("Clean Exit ..");
        }
    }
    Ok(())
}
