// evm-bridge/src/lib.rs

//! EVM execution over state held in a replicated ledger
//!
//! This crate provides:
//! - Contract descriptors (ABI + bytecode) and signing accounts
//! - A Merkle-Patricia state trie whose nodes live in ledger instances
//! - Verified state snapshots backing local read-only calls via revm
//! - `EvmClient`: deploy, transaction, call, credit and balance operations
//! - `EvmContract`: the ledger-side logic that executes committed transactions

pub mod config;
pub mod descriptor;
pub mod account;
pub mod nodes;
pub mod state;
pub mod snapshot;
pub mod engine;
pub mod contract;
pub mod bridge;

#[cfg(test)]
mod testing;

pub use config::{BlockContext, BridgeConfig, ChainConfig, EngineConfig, Hardfork, VmConfig};
pub use descriptor::ContractDescriptor;
pub use account::EvmAccount;
pub use state::{AccountRecord, EvmStateValue};
pub use snapshot::{fetch_snapshot, StateSnapshot};
pub use engine::{CallOutcome, Engine};
pub use contract::{EvmContract, EVM_CONTRACT_ID};
pub use bridge::EvmClient;

pub use ethers_core::abi::Token;
pub use revm::primitives::{Address, U256};

use bridge_crypto::CryptoError;
use ledger::{InstanceId, LedgerError};

/// Wei in one ether
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by bridge operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Arguments do not match the contract interface
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Signing error: {0}")]
    Signing(String),

    /// The ledger proof did not verify. Never retried.
    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    #[error("Instance not found: {0}")]
    MissingInstance(InstanceId),

    #[error("Rejected by the ledger: {0}")]
    Rejected(String),

    /// Outcome unknown: the transaction may still be committed later
    #[error("Not committed within {blocks} block intervals")]
    CommitTimeout { blocks: u32 },

    #[error("Contract reverted: {reason}")]
    ContractRevert { reason: String },

    #[error("Contract {0} is not deployed")]
    NotDeployed(String),

    #[error("Execution halted: {0}")]
    ExecutionHalted(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<LedgerError> for BridgeError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Rejected(reason) => BridgeError::Rejected(reason),
            LedgerError::CommitTimeout { blocks } => BridgeError::CommitTimeout { blocks },
            LedgerError::ProofVerification(reason) => BridgeError::ProofVerification(reason),
            LedgerError::MissingInstance(id) => BridgeError::MissingInstance(id),
            LedgerError::Crypto(e) => BridgeError::Crypto(e),
            other => BridgeError::Ledger(other.to_string()),
        }
    }
}

impl From<bincode::Error> for BridgeError {
    fn from(e: bincode::Error) -> Self {
        BridgeError::Decoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_keep_their_kind() {
        let timeout: BridgeError = LedgerError::CommitTimeout { blocks: 5 }.into();
        assert!(matches!(timeout, BridgeError::CommitTimeout { blocks: 5 }));

        let rejected: BridgeError = LedgerError::Rejected("bad counter".into()).into();
        assert!(matches!(rejected, BridgeError::Rejected(ref r) if r == "bad counter"));

        let missing: BridgeError = LedgerError::MissingInstance(InstanceId::new([3u8; 32])).into();
        assert!(matches!(missing, BridgeError::MissingInstance(_)));
    }
}
