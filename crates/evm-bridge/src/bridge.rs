// evm-bridge/src/bridge.rs

use crate::{
    account::{to_eth_u256, to_h160},
    contract::{COMMAND_CREDIT, COMMAND_TRANSACTION, EVM_CONTRACT_ID},
    snapshot::{fetch_snapshot, StateSnapshot},
    BridgeConfig, BridgeError, BridgeResult, ContractDescriptor, Engine, EvmAccount, Token,
};
use bridge_crypto::KeyPair;
use ethers_core::types::TransactionRequest;
use ledger::{Arguments, InstanceId, InstructionClient, LedgerClient, Receipt};
use revm::primitives::{Address, U256};
use std::sync::Arc;

/// Client of one EVM instance hosted by the ledger.
///
/// State-changing operations are signed transactions submitted through the
/// ledger and awaited until committed. Read-only operations run locally
/// against a freshly fetched, verified snapshot.
pub struct EvmClient<C> {
    protocol: InstructionClient<C>,
    instance_id: InstanceId,
    config: BridgeConfig,
}

impl<C: LedgerClient + 'static> EvmClient<C> {
    /// Create a new EVM instance by spawning it through `base_id`
    pub async fn spawn(
        client: Arc<C>,
        signer: KeyPair,
        base_id: InstanceId,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        let protocol = InstructionClient::new(client, signer, config.max_block_intervals);
        let instance_id = protocol
            .spawn_instance(base_id, EVM_CONTRACT_ID, Arguments::new())
            .await?;

        Ok(Self {
            protocol,
            instance_id,
            config,
        })
    }

    /// Connect to an existing EVM instance
    pub fn new(client: Arc<C>, signer: KeyPair, instance_id: InstanceId, config: BridgeConfig) -> Self {
        Self {
            protocol: InstructionClient::new(client, signer, config.max_block_intervals),
            instance_id,
            config,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<C> {
        self.protocol.client()
    }

    /// Deploy `contract` from `account`. On success the contract address is
    /// recorded on the descriptor and the account nonce advances by one.
    pub async fn deploy(
        &self,
        gas_limit: u64,
        gas_price: U256,
        value: U256,
        account: &mut EvmAccount,
        contract: &mut ContractDescriptor,
        args: &[Token],
    ) -> BridgeResult<Address> {
        let payload = contract.creation_payload(args)?;
        let nonce = account.nonce();
        let tx = TransactionRequest::new()
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(to_eth_u256(gas_price))
            .value(to_eth_u256(value))
            .data(payload);

        let receipt = self.submit(account, &tx).await?;

        let address = account.address().create(nonce);
        contract.set_address(address);
        account.advance_nonce();

        tracing::info!(
            "Deployed {} from {} in block {}",
            contract, account, receipt.block_index
        );
        Ok(address)
    }

    /// Call `method` of a deployed contract in a committed transaction
    #[allow(clippy::too_many_arguments)]
    pub async fn transaction(
        &self,
        gas_limit: u64,
        gas_price: U256,
        value: U256,
        account: &mut EvmAccount,
        contract: &ContractDescriptor,
        method: &str,
        args: &[Token],
    ) -> BridgeResult<Receipt> {
        let to = contract.deployed_address()?;
        let payload = contract.pack_method(method, args)?;
        let tx = TransactionRequest::new()
            .nonce(account.nonce())
            .to(to_h160(to))
            .gas(gas_limit)
            .gas_price(to_eth_u256(gas_price))
            .value(to_eth_u256(value))
            .data(payload);

        let receipt = self.submit(account, &tx).await?;
        account.advance_nonce();

        tracing::info!(
            "{}.{} from {} committed in block {}",
            contract, method, account, receipt.block_index
        );
        Ok(receipt)
    }

    /// Run `method` locally against the latest committed state. Nothing is
    /// submitted and no nonce is used.
    pub async fn call(
        &self,
        account: &EvmAccount,
        contract: &ContractDescriptor,
        method: &str,
        args: &[Token],
    ) -> BridgeResult<Vec<Token>> {
        let to = contract.deployed_address()?;
        let payload = contract.pack_method(method, args)?;
        let snapshot = self.snapshot().await?;
        tracing::debug!(
            "Calling {}.{} at block {}",
            contract, method, snapshot.block_index()
        );

        let engine = Engine::new(self.config.engine.clone());
        let caller = account.address();
        let gas_limit = self.config.call_gas_limit;
        let outcome = blocking(move || {
            engine.call(snapshot.into_view(), caller, to, payload, gas_limit, U256::ZERO)
        })
        .await?;

        contract.unpack_result(method, &outcome.output)
    }

    /// Add `amount` wei to the balance of `address`
    pub async fn credit_account(&self, amount: U256, address: Address) -> BridgeResult<Receipt> {
        let args = Arguments::new()
            .with("address", address.to_vec())
            .with("amount", amount.to_be_bytes::<32>().to_vec());
        let receipt = self
            .protocol
            .invoke(self.instance_id, EVM_CONTRACT_ID, COMMAND_CREDIT, args)
            .await?;

        tracing::info!("Credited {} wei to {}", amount, address);
        Ok(receipt)
    }

    /// Committed balance of `address`, zero for unknown accounts
    pub async fn get_account_balance(&self, address: Address) -> BridgeResult<U256> {
        let snapshot = self.snapshot().await?;
        blocking(move || snapshot.balance(address)).await
    }

    /// Committed nonce of `address`, to reconcile an account after a
    /// submission timed out
    pub async fn get_account_nonce(&self, address: Address) -> BridgeResult<u64> {
        let snapshot = self.snapshot().await?;
        blocking(move || snapshot.nonce(address)).await
    }

    async fn snapshot(&self) -> BridgeResult<StateSnapshot<C>> {
        fetch_snapshot(self.protocol.client(), self.instance_id).await
    }

    async fn submit(&self, account: &EvmAccount, tx: &TransactionRequest) -> BridgeResult<Receipt> {
        let signed = account.sign_and_serialize(tx)?;
        let args = Arguments::new().with("tx", signed);
        let receipt = self
            .protocol
            .invoke(self.instance_id, EVM_CONTRACT_ID, COMMAND_TRANSACTION, args)
            .await?;
        Ok(receipt)
    }
}

/// Run snapshot reads off the async workers; they block on ledger requests
async fn blocking<T, F>(f: F) -> BridgeResult<T>
where
    F: FnOnce() -> BridgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BridgeError::Engine(format!("execution task failed: {e}")))?
}
