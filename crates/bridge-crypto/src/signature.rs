// bridge-crypto/src/signature.rs

use crate::{CryptoError, CryptoResult, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported signature schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// Ed25519 (fast, deterministic)
    Ed25519,
    /// SECP256k1 (Ethereum-compatible)
    Secp256k1,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::Ed25519 => "ed25519",
            SignatureScheme::Secp256k1 => "secp256k1",
        }
    }
}

/// Digital signature wrapper
#[derive(Clone, Serialize, Deserialize)]
pub struct Signature {
    scheme: SignatureScheme,
    bytes: Vec<u8>,
}

impl Signature {
    /// Create a new signature
    pub fn new(scheme: SignatureScheme, bytes: Vec<u8>) -> Self {
        Self { scheme, bytes }
    }

    /// Get the signature scheme
    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Get the signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Verify this signature is valid for the given message and public key
    pub fn verify(&self, message: &[u8], public_key: &PublicKey) -> CryptoResult<bool> {
        if self.scheme != public_key.scheme() {
            return Ok(false);
        }

        match self.scheme {
            SignatureScheme::Ed25519 => self.verify_ed25519(message, public_key),
            SignatureScheme::Secp256k1 => self.verify_secp256k1(message, public_key),
        }
    }

    fn verify_ed25519(&self, message: &[u8], public_key: &PublicKey) -> CryptoResult<bool> {
        use ed25519_dalek::{Signature as Ed25519Sig, Verifier, VerifyingKey};

        let sig = Ed25519Sig::from_slice(&self.bytes)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let pk = VerifyingKey::from_bytes(
            public_key.as_bytes().try_into()
                .map_err(|_| CryptoError::InvalidPublicKey)?
        ).map_err(|_| CryptoError::InvalidPublicKey)?;

        Ok(pk.verify(message, &sig).is_ok())
    }

    fn verify_secp256k1(&self, message: &[u8], public_key: &PublicKey) -> CryptoResult<bool> {
        use secp256k1::{ecdsa::Signature as Secp256k1Sig, Message, PublicKey as Secp256k1Pk, Secp256k1};

        let secp = Secp256k1::verification_only();

        let sig = Secp256k1Sig::from_compact(&self.bytes)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let pk = Secp256k1Pk::from_slice(public_key.as_bytes())
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        // Hash the message for SECP256k1
        let msg_hash = crate::hash::Hashable::hash(message);
        let msg = Message::from_digest_slice(msg_hash.as_bytes())
            .map_err(|_| CryptoError::InvalidSignature)?;

        Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signature({:?}, {}...)",
            self.scheme,
            hex::encode(&self.bytes[..8.min(self.bytes.len())])
        )
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.bytes == other.bytes
    }
}

impl Eq for Signature {}

/// SECP256k1 signature over a 32-byte prehash, with the recovery id needed to
/// get the signer back. This is the shape Ethereum transactions carry.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0 or 1
    pub recovery_id: u8,
}

impl RecoverableSignature {
    /// Recover the Ethereum address of the key that produced this signature
    pub fn recover_address(&self, prehash: &[u8; 32]) -> CryptoResult<[u8; 20]> {
        use secp256k1::{
            ecdsa::{RecoverableSignature as Secp256k1RecSig, RecoveryId},
            Message, Secp256k1,
        };

        let recovery_id = RecoveryId::from_i32(self.recovery_id as i32)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);
        let sig = Secp256k1RecSig::from_compact(&compact, recovery_id)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let msg = Message::from_digest_slice(prehash)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let pk = Secp256k1::verification_only()
            .recover_ecdsa(&msg, &sig)
            .map_err(|_| CryptoError::InvalidSignature)?;

        Ok(crate::keypair::ethereum_address(&pk.serialize_uncompressed()))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecoverableSignature(r={}..., v={})",
            hex::encode(&self.r[..4]),
            self.recovery_id
        )
    }
}
