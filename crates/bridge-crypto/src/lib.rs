// bridge-crypto/src/lib.rs

//! Cryptographic primitives shared by the ledger client and the EVM bridge
//!
//! This crate provides:
//! - Hashing functions (SHA256, Keccak-256)
//! - Digital signatures (Ed25519 for ledger signers, SECP256k1 for EVM accounts)
//! - Key pair management and Ethereum address derivation
//! - Merkle tree with inclusion proofs

pub mod hash;
pub mod signature;
pub mod keypair;
pub mod merkle;

pub use hash::{keccak256, Hash, HashAlgorithm, Hashable};
pub use signature::{RecoverableSignature, Signature, SignatureScheme};
pub use keypair::{KeyPair, PublicKey, SecretKey};
pub use merkle::{MerkleProof, MerkleTree};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Unsupported operation for {0:?} keys")]
    UnsupportedScheme(SignatureScheme),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Merkle tree error: {0}")]
    MerkleError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_basics() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let message = b"Hello, ledger!";
        let signature = keypair.sign(message).unwrap();
        assert!(keypair.public_key().verify(message, &signature).unwrap());
    }
}
