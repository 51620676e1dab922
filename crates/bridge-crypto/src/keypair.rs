// bridge-crypto/src/keypair.rs

use crate::{hash::keccak256, CryptoError, CryptoResult, RecoverableSignature, Signature, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public key wrapper
#[derive(Clone, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    scheme: SignatureScheme,
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(scheme: SignatureScheme, bytes: Vec<u8>) -> Self {
        Self { scheme, bytes }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<bool> {
        signature.verify(message, self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PublicKey({:?}, {}...)",
            self.scheme,
            hex::encode(&self.bytes[..8.min(self.bytes.len())])
        )
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.bytes == other.bytes
    }
}

impl Eq for PublicKey {}

/// Secret/Private key wrapper (kept private)
pub struct SecretKey {
    scheme: SignatureScheme,
    bytes: Vec<u8>,
}

impl SecretKey {
    pub fn new(scheme: SignatureScheme, bytes: Vec<u8>) -> Self {
        Self { scheme, bytes }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        // Zero out the key material on drop
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({:?}, [REDACTED])", self.scheme)
    }
}

/// Key pair containing both public and secret keys
pub struct KeyPair {
    scheme: SignatureScheme,
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate(scheme: SignatureScheme) -> CryptoResult<Self> {
        match scheme {
            SignatureScheme::Ed25519 => Self::generate_ed25519(),
            SignatureScheme::Secp256k1 => Self::generate_secp256k1(),
        }
    }

    fn generate_ed25519() -> CryptoResult<Self> {
        use ed25519_dalek::SigningKey;
        use rand::rngs::OsRng;

        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_secret_bytes(SignatureScheme::Ed25519, &signing_key.to_bytes())
    }

    fn generate_secp256k1() -> CryptoResult<Self> {
        use rand::rngs::OsRng;
        use secp256k1::SecretKey as Secp256k1Sk;

        let mut rng = OsRng;
        let secret_key = Secp256k1Sk::new(&mut rng);
        Self::from_secret_bytes(SignatureScheme::Secp256k1, &secret_key.secret_bytes())
    }

    /// Rebuild a keypair from raw secret key material, deriving the public key
    pub fn from_secret_bytes(scheme: SignatureScheme, secret: &[u8]) -> CryptoResult<Self> {
        let public_bytes = match scheme {
            SignatureScheme::Ed25519 => {
                use ed25519_dalek::SigningKey;

                let bytes: &[u8; 32] = secret.try_into()
                    .map_err(|_| CryptoError::InvalidSecretKey)?;
                SigningKey::from_bytes(bytes).verifying_key().to_bytes().to_vec()
            }
            SignatureScheme::Secp256k1 => {
                use secp256k1::{PublicKey as Secp256k1Pk, Secp256k1, SecretKey as Secp256k1Sk};

                let secp = Secp256k1::signing_only();
                let secret_key = Secp256k1Sk::from_slice(secret)
                    .map_err(|_| CryptoError::InvalidSecretKey)?;
                Secp256k1Pk::from_secret_key(&secp, &secret_key).serialize().to_vec()
            }
        };

        Ok(Self {
            scheme,
            public_key: PublicKey::new(scheme, public_bytes),
            secret_key: SecretKey::new(scheme, secret.to_vec()),
        })
    }

    /// Parse a hex encoded secret key (an optional `0x` prefix is accepted)
    pub fn from_secret_hex(scheme: SignatureScheme, s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        Self::from_secret_bytes(scheme, &bytes)
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        match self.scheme {
            SignatureScheme::Ed25519 => self.sign_ed25519(message),
            SignatureScheme::Secp256k1 => self.sign_secp256k1(message),
        }
    }

    fn sign_ed25519(&self, message: &[u8]) -> CryptoResult<Signature> {
        use ed25519_dalek::{Signature as Ed25519Sig, Signer, SigningKey};

        let signing_key = SigningKey::from_bytes(
            self.secret_key.as_bytes().try_into()
                .map_err(|_| CryptoError::InvalidSecretKey)?
        );

        let signature: Ed25519Sig = signing_key.sign(message);
        Ok(Signature::new(
            SignatureScheme::Ed25519,
            signature.to_bytes().to_vec(),
        ))
    }

    fn sign_secp256k1(&self, message: &[u8]) -> CryptoResult<Signature> {
        use secp256k1::{ecdsa::Signature as Secp256k1Sig, Message, SecretKey as Secp256k1Sk, Secp256k1};

        let secp = Secp256k1::signing_only();

        let secret_key = Secp256k1Sk::from_slice(self.secret_key.as_bytes())
            .map_err(|_| CryptoError::InvalidSecretKey)?;

        // Hash the message
        let msg_hash = crate::hash::Hashable::hash(message);
        let msg = Message::from_digest_slice(msg_hash.as_bytes())
            .map_err(|_| CryptoError::InvalidSignature)?;

        let signature: Secp256k1Sig = secp.sign_ecdsa(&msg, &secret_key);
        Ok(Signature::new(
            SignatureScheme::Secp256k1,
            signature.serialize_compact().to_vec(),
        ))
    }

    /// Sign an already hashed 32-byte digest, keeping the recovery id.
    /// Only SECP256k1 keys support this.
    pub fn sign_prehash_recoverable(&self, prehash: &[u8; 32]) -> CryptoResult<RecoverableSignature> {
        use secp256k1::{Message, SecretKey as Secp256k1Sk, Secp256k1};

        if self.scheme != SignatureScheme::Secp256k1 {
            return Err(CryptoError::UnsupportedScheme(self.scheme));
        }

        let secp = Secp256k1::signing_only();
        let secret_key = Secp256k1Sk::from_slice(self.secret_key.as_bytes())
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        let msg = Message::from_digest_slice(prehash)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&msg, &secret_key)
            .serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);

        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_i32() as u8,
        })
    }

    /// Ethereum address of a SECP256k1 keypair: the last 20 bytes of the
    /// Keccak-256 hash of the uncompressed public key (without its 0x04 tag)
    pub fn ethereum_address(&self) -> CryptoResult<[u8; 20]> {
        use secp256k1::PublicKey as Secp256k1Pk;

        if self.scheme != SignatureScheme::Secp256k1 {
            return Err(CryptoError::UnsupportedScheme(self.scheme));
        }

        let pk = Secp256k1Pk::from_slice(self.public_key.as_bytes())
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(ethereum_address(&pk.serialize_uncompressed()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("scheme", &self.scheme)
            .field("public_key", &self.public_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

pub(crate) fn ethereum_address(uncompressed: &[u8; 65]) -> [u8; 20] {
    let hash = keccak256(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash.as_bytes()[12..32]);
    address
}
