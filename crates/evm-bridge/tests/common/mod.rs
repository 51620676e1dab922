// evm-bridge/tests/common/mod.rs

#![allow(dead_code)]

use bridge_crypto::{KeyPair, SignatureScheme};
use evm_bridge::{BridgeConfig, ContractDescriptor, EngineConfig, EvmClient, EvmContract, EVM_CONTRACT_ID};
use ledger::{Identity, MemoryLedger, MemoryLedgerConfig};
use std::sync::Arc;

pub const STORAGE_ABI: &str = r#"[
    {"type":"constructor","stateMutability":"nonpayable",
     "inputs":[{"name":"initial","type":"uint256"}]},
    {"type":"function","name":"set","stateMutability":"nonpayable",
     "inputs":[{"name":"x","type":"uint256"}],"outputs":[]},
    {"type":"function","name":"get","stateMutability":"view",
     "inputs":[],"outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"reset","stateMutability":"nonpayable",
     "inputs":[],"outputs":[]}
]"#;

/// `constructor(uint256)`, `set(uint256)`, `get()`. There is no `reset`
/// in the code, so calling it reverts.
pub const STORAGE_INIT_CODE: &str = concat!(
    "60206020380360003960005160005560328060",
    "1a",
    "6000396000f3",
    "60003560e01c806360fe47b114601e5780636d4ce63c14602657600080fd5b600435600055005b60005460005260206000f3",
);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn storage() -> ContractDescriptor {
    ContractDescriptor::new("Storage", STORAGE_ABI, STORAGE_INIT_CODE).unwrap()
}

pub struct TestNet {
    pub ledger: Arc<MemoryLedger>,
    pub admin: KeyPair,
}

impl TestNet {
    pub fn new() -> Self {
        Self::with_block_interval(50)
    }

    pub fn with_block_interval(block_interval_ms: u64) -> Self {
        init_tracing();
        let admin = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let ledger = MemoryLedger::new(
            MemoryLedgerConfig { block_interval_ms },
            vec![Identity::of(&admin)],
        )
        .unwrap()
        .with_contract(EVM_CONTRACT_ID, Arc::new(EvmContract::new(EngineConfig::default())));

        Self {
            ledger: Arc::new(ledger),
            admin,
        }
    }

    /// A fresh handle on the admin key
    pub fn signer(&self) -> KeyPair {
        KeyPair::from_secret_bytes(SignatureScheme::Ed25519, self.admin.secret_key().as_bytes())
            .unwrap()
    }

    pub async fn spawn_evm(&self) -> EvmClient<MemoryLedger> {
        EvmClient::spawn(
            Arc::clone(&self.ledger),
            self.signer(),
            self.ledger.genesis_instance_id(),
            BridgeConfig::default(),
        )
        .await
        .unwrap()
    }
}
