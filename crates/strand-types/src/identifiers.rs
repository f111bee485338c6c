//! Participant identifiers for strand channels.
//!
//! Each participant is known by a long-term *public identifier*: the textual
//! encoding of a secp256k1 public key, prefixed with `strand`. The identifier
//! travels in every protocol message; the keccak-derived 20-byte account
//! address is used on-chain and inside commitments.
//!
//! # Example
//!
//! ```
//! use strand_types::identifiers::PublicIdentifier;
//!
//! let id: PublicIdentifier =
//!     "strand0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
//!         .parse()
//!         .unwrap();
//! assert!(id.as_str().starts_with("strand"));
//! let _address = id.address();
//! ```

use alloy_primitives::{Address, keccak256};
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Prefix of every strand public identifier.
pub const IDENTIFIER_PREFIX: &str = "strand";

/// A participant's long-term public identifier.
///
/// The wire form is `strand` followed by the lowercase hex encoding of the
/// 33-byte compressed secp256k1 public key. Parsing validates that the
/// payload is a point on the curve and precomputes the derived account
/// address, so [`PublicIdentifier::address`] is infallible afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicIdentifier {
    encoded: String,
    address: Address,
}

impl PublicIdentifier {
    /// Builds an identifier from a verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let compressed = key.to_encoded_point(true);
        let encoded = format!("{IDENTIFIER_PREFIX}{}", hex::encode(compressed.as_bytes()));
        let address = address_of_key(key);
        PublicIdentifier { encoded, address }
    }

    /// The textual wire form of this identifier.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The keccak-derived 20-byte account address of this identifier.
    ///
    /// Computed once at parse time from the decompressed public key, so this
    /// never re-validates the curve point.
    pub fn address(&self) -> Address {
        self.address
    }
}

fn address_of_key(key: &VerifyingKey) -> Address {
    let uncompressed = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag, hash the 64-byte point, keep the low 20 bytes.
    let digest = keccak256(&uncompressed.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

/// Errors produced when parsing a [`PublicIdentifier`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier does not start with the `strand` prefix.
    #[error("identifier is missing the '{IDENTIFIER_PREFIX}' prefix: {0}")]
    MissingPrefix(String),
    /// The payload after the prefix is not valid hex.
    #[error("identifier payload is not hex: {0}")]
    InvalidHex(String),
    /// The payload does not decode to a secp256k1 point.
    #[error("identifier payload is not a valid compressed secp256k1 key")]
    InvalidKey,
}

impl FromStr for PublicIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = s
            .strip_prefix(IDENTIFIER_PREFIX)
            .ok_or_else(|| IdentifierError::MissingPrefix(s.to_string()))?;
        let bytes =
            hex::decode(payload).map_err(|_| IdentifierError::InvalidHex(payload.to_string()))?;
        let key =
            VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| IdentifierError::InvalidKey)?;
        let address = address_of_key(&key);
        Ok(PublicIdentifier {
            encoded: format!("{IDENTIFIER_PREFIX}{}", hex::encode(bytes)),
            address,
        })
    }
}

impl fmt::Display for PublicIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl Serialize for PublicIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for PublicIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
