// evm-bridge/src/account.rs

use crate::{BridgeError, BridgeResult};
use bridge_crypto::{KeyPair, SignatureScheme};
use ethers_core::types::{Signature as EthSignature, TransactionRequest, H160, U256 as EthU256};
use revm::primitives::{Address, U256};
use std::fmt;

/// An externally owned account: a secp256k1 key, its address, and the nonce
/// the next transaction will carry.
///
/// Not synchronized. Callers serialize state-changing operations per account.
pub struct EvmAccount {
    address: Address,
    keypair: KeyPair,
    nonce: u64,
}

impl EvmAccount {
    pub fn from_private_key_hex(private_key: &str) -> BridgeResult<Self> {
        let keypair = KeyPair::from_secret_hex(SignatureScheme::Secp256k1, private_key)
            .map_err(|e| BridgeError::Signing(e.to_string()))?;
        Self::from_keypair(keypair)
    }

    pub fn generate() -> BridgeResult<Self> {
        let keypair = KeyPair::generate(SignatureScheme::Secp256k1)
            .map_err(|e| BridgeError::Signing(e.to_string()))?;
        Self::from_keypair(keypair)
    }

    fn from_keypair(keypair: KeyPair) -> BridgeResult<Self> {
        let address = keypair
            .ethereum_address()
            .map_err(|e| BridgeError::Signing(e.to_string()))?;
        Ok(Self {
            address: Address::from(address),
            keypair,
            nonce: 0,
        })
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Overwrite the local nonce, e.g. with the committed one after a
    /// submission timed out
    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    pub(crate) fn advance_nonce(&mut self) {
        self.nonce += 1;
    }

    /// Sign `tx` and return its RLP encoding, ready to be executed
    pub fn sign_and_serialize(&self, tx: &TransactionRequest) -> BridgeResult<Vec<u8>> {
        let sighash = tx.sighash();
        let signature = self
            .keypair
            .sign_prehash_recoverable(&sighash.0)
            .map_err(|e| BridgeError::Signing(e.to_string()))?;

        let recovery_id = u64::from(signature.recovery_id);
        let v = match tx.chain_id {
            Some(chain_id) => recovery_id + chain_id.as_u64() * 2 + 35,
            None => recovery_id + 27,
        };

        let signed = tx.rlp_signed(&EthSignature {
            r: EthU256::from_big_endian(&signature.r),
            s: EthU256::from_big_endian(&signature.s),
            v,
        });
        Ok(signed.to_vec())
    }
}

impl fmt::Display for EvmAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmAccount[{}]", self.address)
    }
}

impl fmt::Debug for EvmAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmAccount")
            .field("address", &self.address)
            .field("nonce", &self.nonce)
            .finish()
    }
}

pub(crate) fn to_h160(address: Address) -> H160 {
    H160::from_slice(address.as_slice())
}

pub(crate) fn from_h160(address: H160) -> Address {
    Address::from(address.0)
}

pub(crate) fn to_eth_u256(value: U256) -> EthU256 {
    EthU256::from_big_endian(&value.to_be_bytes::<32>())
}

pub(crate) fn from_eth_u256(value: EthU256) -> U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::utils::rlp::Rlp;

    const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_from_private_key() {
        let account = EvmAccount::from_private_key_hex(HARDHAT_KEY).unwrap();
        assert_eq!(
            hex::encode(account.address()),
            "f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(account.nonce(), 0);
        assert!(account.to_string().starts_with("EvmAccount[0x"));
    }

    #[test]
    fn test_bad_key_is_a_signing_error() {
        assert!(matches!(
            EvmAccount::from_private_key_hex("not hex"),
            Err(BridgeError::Signing(_))
        ));
    }

    #[test]
    fn test_signed_transaction_recovers_sender() {
        let account = EvmAccount::generate().unwrap().with_nonce(3);
        let tx = TransactionRequest::new()
            .nonce(account.nonce())
            .to(H160::repeat_byte(0x22))
            .value(5u64)
            .gas(100_000u64)
            .gas_price(1u64)
            .data(vec![0xde, 0xad]);

        let raw = account.sign_and_serialize(&tx).unwrap();
        let (decoded, signature) = TransactionRequest::decode_signed_rlp(&Rlp::new(&raw)).unwrap();

        assert_eq!(decoded.nonce, Some(EthU256::from(3u64)));
        assert!(signature.v == 27 || signature.v == 28);
        let sender = signature.recover(decoded.sighash()).unwrap();
        assert_eq!(from_h160(sender), account.address());
    }

    #[test]
    fn test_nonce_bookkeeping() {
        let mut account = EvmAccount::generate().unwrap();
        account.advance_nonce();
        account.advance_nonce();
        assert_eq!(account.nonce(), 2);
        account.set_nonce(7);
        assert_eq!(account.nonce(), 7);
    }

    #[test]
    fn test_u256_conversions() {
        let value = U256::from(123_456_789u64) << 100usize;
        assert_eq!(from_eth_u256(to_eth_u256(value)), value);
        let address = Address::repeat_byte(0xab);
        assert_eq!(from_h160(to_h160(address)), address);
    }
}
