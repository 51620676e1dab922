// evm-bridge/src/engine.rs

use crate::{BridgeError, BridgeResult, EngineConfig};
use ethers_core::abi::{self, ParamType, Token};
use revm::primitives::{
    Address, Bytes, EVMError, ExecutionResult, Output, ResultAndState, TxEnv, TxKind, U256,
};
use revm::{DatabaseRef, Evm};

/// Selector of `Error(string)`
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Successful execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub output: Vec<u8>,
    pub gas_used: u64,
    pub gas_left: u64,
    /// Set when a contract was created
    pub created: Option<Address>,
}

/// The execution engine, configured once and run against any state view
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Message call from `caller` to `target`. Nothing is persisted and the
    /// caller's nonce is not checked.
    pub fn call<DB>(
        &self,
        db: DB,
        caller: Address,
        target: Address,
        payload: Vec<u8>,
        gas_limit: u64,
        value: U256,
    ) -> BridgeResult<CallOutcome>
    where
        DB: DatabaseRef<Error = BridgeError>,
    {
        let tx = TxEnv {
            caller,
            gas_limit,
            gas_price: U256::ZERO,
            transact_to: TxKind::Call(target),
            value,
            data: Bytes::from(payload),
            nonce: None,
            chain_id: None,
            ..Default::default()
        };

        // Calls are free: no base fee, so no balance is needed for gas
        let ResultAndState { result, .. } = self.run(db, tx, true)?;
        settle(result, gas_limit)
    }

    /// Execute a transaction and return its result along with every
    /// account it touched. The caller decides whether to persist them.
    pub fn transact<DB>(&self, db: DB, tx: TxEnv) -> BridgeResult<ResultAndState>
    where
        DB: DatabaseRef<Error = BridgeError>,
    {
        self.run(db, tx, false)
    }

    fn run<DB>(&self, db: DB, tx: TxEnv, free: bool) -> BridgeResult<ResultAndState>
    where
        DB: DatabaseRef<Error = BridgeError>,
    {
        let chain = &self.config.chain;
        let block = &self.config.block;
        let vm = &self.config.vm;

        let mut evm = Evm::builder()
            .with_ref_db(db)
            .with_spec_id(chain.hardfork.spec_id())
            .modify_cfg_env(|cfg| {
                cfg.chain_id = chain.chain_id;
                cfg.limit_contract_code_size = vm.limit_contract_code_size;
            })
            .modify_block_env(|env| {
                env.number = U256::from(block.number);
                env.timestamp = U256::from(block.timestamp);
                env.coinbase = block.coinbase;
                env.gas_limit = block.gas_limit.map(U256::from).unwrap_or(U256::MAX);
                env.basefee = if free { U256::ZERO } else { U256::from(block.base_fee) };
            })
            .modify_tx_env(|env| *env = tx)
            .build();

        evm.transact().map_err(|e| match e {
            EVMError::Database(e) => e,
            EVMError::Transaction(invalid) => {
                BridgeError::Rejected(format!("invalid transaction: {invalid}"))
            }
            other => BridgeError::Engine(other.to_string()),
        })
    }
}

/// Turn an execution result into an outcome, or the error it amounts to
pub fn settle(result: ExecutionResult, gas_limit: u64) -> BridgeResult<CallOutcome> {
    match result {
        ExecutionResult::Success {
            gas_used, output, ..
        } => {
            let (output, created) = match output {
                Output::Call(bytes) => (bytes.to_vec(), None),
                Output::Create(bytes, address) => (bytes.to_vec(), address),
            };
            Ok(CallOutcome {
                output,
                gas_used,
                gas_left: gas_limit.saturating_sub(gas_used),
                created,
            })
        }
        ExecutionResult::Revert { output, .. } => Err(BridgeError::ContractRevert {
            reason: revert_reason(&output),
        }),
        ExecutionResult::Halt { reason, .. } => {
            Err(BridgeError::ExecutionHalted(format!("{reason:?}")))
        }
    }
}

/// Decoded `Error(string)` payload, or the raw payload in hex
pub fn revert_reason(output: &[u8]) -> String {
    if output.is_empty() {
        return "no reason given".into();
    }

    if output.len() > 4 && output[..4] == ERROR_SELECTOR {
        if let Ok(tokens) = abi::decode(&[ParamType::String], &output[4..]) {
            if let Some(Token::String(reason)) = tokens.into_iter().next() {
                return reason;
            }
        }
    }

    format!("0x{}", hex::encode(output))
}
