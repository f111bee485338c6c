//! Commitment signing and verification.
//!
//! Participants sign commitment hashes with plain secp256k1 over the prehash
//! (no EIP-191 prefix; the channel contract recovers over the raw hash).
//! Verification recovers the signer address and compares it against the
//! expected participant.

use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;

use crate::identifiers::PublicIdentifier;

/// Errors from signing or verifying commitments.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error(transparent)]
    Signer(#[from] alloy_signer::Error),
    #[error("signature is malformed: {0}")]
    Malformed(String),
    #[error("signature recovered {recovered}, expected {expected}")]
    WrongSigner { recovered: Address, expected: Address },
}

/// A participant's signing identity: a local private key plus the derived
/// public identifier.
#[derive(Debug, Clone)]
pub struct ChannelSigner {
    inner: PrivateKeySigner,
    public_identifier: PublicIdentifier,
}

impl ChannelSigner {
    pub fn new(inner: PrivateKeySigner) -> Self {
        let public_identifier =
            PublicIdentifier::from_verifying_key(inner.credential().verifying_key());
        ChannelSigner {
            inner,
            public_identifier,
        }
    }

    /// Builds a signer from a raw 32-byte private key.
    pub fn from_bytes(key: &B256) -> Result<Self, SigningError> {
        let inner = PrivateKeySigner::from_bytes(key)
            .map_err(|e| SigningError::Malformed(e.to_string()))?;
        Ok(Self::new(inner))
    }

    pub fn public_identifier(&self) -> &PublicIdentifier {
        &self.public_identifier
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Signs a commitment hash, returning the 65-byte r||s||v signature.
    pub async fn sign_commitment(&self, hash: B256) -> Result<Bytes, SigningError> {
        let signature = self.inner.sign_hash(&hash).await?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }
}

/// Recovers the address that signed `hash`.
pub fn recover_commitment_signer(hash: B256, signature: &Bytes) -> Result<Address, SigningError> {
    let signature = Signature::try_from(signature.as_ref())
        .map_err(|e| SigningError::Malformed(e.to_string()))?;
    signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| SigningError::Malformed(e.to_string()))
}

/// Verifies that `signature` over `hash` was produced by `expected`.
pub fn verify_commitment_signature(
    hash: B256,
    signature: &Bytes,
    expected: Address,
) -> Result<(), SigningError> {
    let recovered = recover_commitment_signer(hash, signature)?;
    if recovered != expected {
        return Err(SigningError::WrongSigner {
            recovered,
            expected,
        });
    }
    Ok(())
}
