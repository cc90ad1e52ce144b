//! Signing key handed over by the wallet's secure storage

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use eyre::{Context, Result};

/// Hex-encoded private key, parsed once
///
/// Never logged: `Debug` only shows the derived address.
#[derive(Clone)]
pub struct SigningKey {
    signer: PrivateKeySigner,
}

impl SigningKey {
    /// Parse a hex-encoded private key (with or without 0x prefix)
    pub fn from_hex(private_key: impl AsRef<str>) -> Result<Self> {
        let key = private_key.as_ref().trim();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let signer: PrivateKeySigner = key.parse().context("Failed to parse private key")?;
        Ok(Self { signer })
    }

    /// Address derived from the key
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The underlying local signer
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

impl From<PrivateKeySigner> for SigningKey {
    fn from(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
