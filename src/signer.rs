// Fortuna Lottery - Settlement key signer
use arrayref::{array_ref, array_refs};
use ed25519_dalek::{Signer as _, SigningKey};

use crate::{
    base58,
    error::{LotteryError, LotteryResult},
};

/// Holds the settlement seed and signs transaction messages in-process.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Build from the 64-byte `seed || public key` keypair encoding.
    ///
    /// The public half must match the key derived from the seed, since it is
    /// used as the payer account of every settlement transaction.
    pub fn from_keypair_bytes(keypair: &[u8; 64]) -> LotteryResult<Self> {
        let (seed, public_key) = array_refs![keypair, 32, 32];
        let signing_key = SigningKey::from_bytes(seed);
        if signing_key.verifying_key().as_bytes() != public_key {
            return Err(LotteryError::InvalidKeypair(
                "public key does not match seed".to_string(),
            ));
        }
        Ok(Self { signing_key })
    }

    /// Parse a base-58 encoded 64-byte keypair
    pub fn from_base58(text: &str) -> LotteryResult<Self> {
        let bytes = base58::decode(text.trim())?;
        if bytes.len() != 64 {
            return Err(LotteryError::InvalidKeypair(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        Self::from_keypair_bytes(array_ref![bytes, 0, 64])
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Payer account of settlement transactions
    pub fn pubkey(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Deterministic Ed25519 signature over `message`
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("pubkey", &base58::encode(&self.pubkey()))
            .finish()
    }
}
