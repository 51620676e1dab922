// ledger/src/lib.rs

//! Client surface of a Byzantine-fault-tolerant replicated ledger
//!
//! This crate provides:
//! - Instance identifiers, signer identities and replay counters
//! - Spawn / Invoke instructions carrying opaque named arguments
//! - Authenticated proofs of instance values
//! - The `LedgerClient` trait and the instruction protocol built on it
//! - The `Contract` trait implemented by ledger-hosted contract logic
//! - `MemoryLedger`, an in-process ledger implementing `LedgerClient`

pub mod types;
pub mod instruction;
pub mod proof;
pub mod client;
pub mod protocol;
pub mod contract;
pub mod memory;

pub use types::{Identity, InstanceId, LedgerIdentity, Receipt};
pub use instruction::{Action, Argument, Arguments, ClientTransaction, Instruction, Invoke, Spawn};
pub use proof::{BlockHeader, Proof, StateEntry};
pub use client::LedgerClient;
pub use protocol::InstructionClient;
pub use contract::{Contract, ReadOnlyState, StateChange};
pub use memory::{MemoryLedger, MemoryLedgerConfig};

use bridge_crypto::CryptoError;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while talking to the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger refused the transaction (authorization, replay counter,
    /// or a contract-level failure)
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The transaction was not observed committed in time. It may still land.
    #[error("Transaction not committed within {blocks} block intervals")]
    CommitTimeout { blocks: u32 },

    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    #[error("Instance not found: {0}")]
    MissingInstance(InstanceId),

    /// Raised by contract logic while processing an instruction
    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
