// ledger/src/types.rs

use bridge_crypto::{hash::Hashable, Hash, KeyPair, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Replay counter of a signer
pub type Counter = u64;

/// Block index
pub type BlockIndex = u64;

/// Opaque 32-byte identifier of a ledger instance
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId([u8; 32]);

impl InstanceId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Identifier derived from arbitrary seed material
    pub fn derive(parts: &[&[u8]]) -> Self {
        let mut buf = Vec::new();
        for part in parts {
            buf.extend_from_slice(part);
        }
        Self(buf.hash().to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<Hash> for InstanceId {
    fn from(hash: Hash) -> Self {
        Self(hash.to_bytes())
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({}...)", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identity of an instruction signer
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(PublicKey);

impl Identity {
    pub fn new(public_key: PublicKey) -> Self {
        Self(public_key)
    }

    pub fn of(keypair: &KeyPair) -> Self {
        Self(keypair.public_key().clone())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.scheme().as_str(), self.0.to_hex())
    }
}

/// What a client needs to know to authenticate proofs from a ledger:
/// its identifier and the collective key signing its blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIdentity {
    pub id: Hash,
    pub collective_key: PublicKey,
}

/// Confirmation that a transaction was committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub block_index: BlockIndex,
    pub tx_hash: Hash,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::SignatureScheme;

    #[test]
    fn test_instance_id_derivation() {
        let a = InstanceId::derive(&[b"base", b"x"]);
        let b = InstanceId::derive(&[b"base", b"x"]);
        let c = InstanceId::derive(&[b"base", b"y"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(InstanceId::from_slice(a.as_bytes()), Some(a));
        assert_eq!(InstanceId::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_identity_display() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let identity = Identity::of(&keypair);
        let shown = identity.to_string();
        assert!(shown.starts_with("ed25519:"));
        assert_eq!(shown.len(), "ed25519:".len() + 64);
    }
}
