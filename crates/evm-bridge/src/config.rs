// evm-bridge/src/config.rs

use revm::primitives::{Address, SpecId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gas allowance for read-only calls: large enough to never limit them
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How many block intervals to wait for a submission to be included
    pub max_block_intervals: u32,
    pub call_gas_limit: u64,
    pub engine: EngineConfig,
}

/// Everything the execution engine needs besides state. Passed explicitly
/// to every engine construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chain: ChainConfig,
    pub block: BlockContext,
    pub vm: VmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub hardfork: Hardfork,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hardfork {
    Istanbul,
    Berlin,
    London,
    Merge,
    #[default]
    Shanghai,
    Cancun,
}

impl Hardfork {
    pub fn spec_id(&self) -> SpecId {
        match self {
            Hardfork::Istanbul => SpecId::ISTANBUL,
            Hardfork::Berlin => SpecId::BERLIN,
            Hardfork::London => SpecId::LONDON,
            Hardfork::Merge => SpecId::MERGE,
            Hardfork::Shanghai => SpecId::SHANGHAI,
            Hardfork::Cancun => SpecId::CANCUN,
        }
    }
}

/// Block the engine pretends to execute in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockContext {
    pub number: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    /// Unbounded when unset
    pub gas_limit: Option<u64>,
    pub base_fee: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Override of the EIP-170 code size limit
    pub limit_contract_code_size: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_block_intervals: 5,
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT,
            engine: EngineConfig::default(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            hardfork: Hardfork::default(),
        }
    }
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            coinbase: Address::ZERO,
            gas_limit: None,
            base_fee: 0,
        }
    }
}

impl BridgeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.max_block_intervals, 5);
        assert_eq!(config.call_gas_limit, DEFAULT_CALL_GAS_LIMIT);
        assert_eq!(config.engine.chain.hardfork.spec_id(), SpecId::SHANGHAI);
        assert!(config.engine.block.gas_limit.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            max_block_intervals = 10

            [engine.chain]
            hardfork = "london"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_block_intervals, 10);
        assert_eq!(config.call_gas_limit, DEFAULT_CALL_GAS_LIMIT);
        assert_eq!(config.engine.chain.hardfork, Hardfork::London);
        assert_eq!(config.engine.chain.chain_id, 1337);
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("evm-bridge-config-{}.toml", std::process::id()));
        let mut config = BridgeConfig::default();
        config.engine.block.number = 42;
        config.engine.vm.limit_contract_code_size = Some(0x10000);

        config.to_file(&path).unwrap();
        let loaded = BridgeConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_hardfork_fails() {
        let result = BridgeConfig::from_toml_str("[engine.chain]\nhardfork = \"frontier\"\n");
        assert!(result.is_err());
    }
}
