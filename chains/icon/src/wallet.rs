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

use sha3::{Digest, Sha3_256};

use btp_relayer_utils::{Error, Result};

/// Signs transaction digests for the relay account.
pub trait Wallet: Send + Sync + 'static {
    /// The `hx..` account address.
    fn address(&self) -> String;
    /// Produces a 65-byte recoverable signature over a 32-byte digest.
    fn sign(&self, digest: &[u8]) -> Result<Vec<u8>>;
}

/// A secp256k1 key wallet.
pub struct KeyWallet {
    secret: libsecp256k1::SecretKey,
    address: String,
}

impl KeyWallet {
    /// Builds a wallet from a hex-encoded secret key.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim_start_matches("0x"))
            .map_err(|e| Error::Wallet(e.to_string()))?;
        let secret = libsecp256k1::SecretKey::parse_slice(&bytes)
            .map_err(|e| Error::Wallet(e.to_string()))?;
        let public = libsecp256k1::PublicKey::from_secret_key(&secret);
        // address = "hx" + last 20 bytes of sha3-256(uncompressed pubkey)
        let serialized = public.serialize();
        let mut hasher = Sha3_256::new();
        hasher.update(&serialized[1..]);
        let digest = hasher.finalize();
        let address = format!("hx{}", hex::encode(&digest[digest.len() - 20..]));
        Ok(Self { secret, address })
    }
}

impl Wallet for KeyWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn sign(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let message = libsecp256k1::Message::parse_slice(digest)
            .map_err(|e| Error::Wallet(e.to_string()))?;
        let (signature, recovery_id) =
            libsecp256k1::sign(&message, &self.secret);
        let mut out = signature.serialize().to_vec();
        out.push(recovery_id.serialize());
        Ok(out)
    }
}
