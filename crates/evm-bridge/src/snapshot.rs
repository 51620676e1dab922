// evm-bridge/src/snapshot.rs

use crate::{
    contract::EVM_CONTRACT_ID,
    state::{node_instance_id, EvmStateValue, StateView},
    nodes::NodeSource,
    BridgeError, BridgeResult,
};
use bridge_crypto::Hash;
use ledger::{InstanceId, LedgerClient, LedgerError};
use revm::primitives::{Address, U256};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Reads trie nodes of one EVM instance from the ledger, one proof per node.
///
/// Blocks on the runtime, so it must only be used from blocking threads.
/// Node contents are checked against their hash, not through the proof.
pub struct LedgerNodeSource<C> {
    client: Arc<C>,
    instance_id: InstanceId,
    runtime: Handle,
}

impl<C: LedgerClient> NodeSource for LedgerNodeSource<C> {
    fn node(&self, hash: &Hash) -> BridgeResult<Option<Vec<u8>>> {
        let id = node_instance_id(&self.instance_id, hash);
        let proof = self.runtime.block_on(self.client.get_proof(&id))?;
        if !proof.matches() {
            return Ok(None);
        }
        Ok(Some(proof.extract_value()?))
    }
}

/// Read-only EVM state as committed in one verified ledger block
pub struct StateSnapshot<C> {
    instance_id: InstanceId,
    block_index: u64,
    view: StateView<LedgerNodeSource<C>>,
}

impl<C: LedgerClient> StateSnapshot<C> {
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Block the snapshot was taken at
    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    pub fn root(&self) -> Hash {
        self.view.root()
    }

    pub fn view(&self) -> &StateView<LedgerNodeSource<C>> {
        &self.view
    }

    pub fn into_view(self) -> StateView<LedgerNodeSource<C>> {
        self.view
    }

    /// Blocking; see [`LedgerNodeSource`]
    pub fn balance(&self, address: Address) -> BridgeResult<U256> {
        self.view.balance(address)
    }

    /// Blocking; see [`LedgerNodeSource`]
    pub fn nonce(&self, address: Address) -> BridgeResult<u64> {
        self.view.nonce(address)
    }
}

/// Fetch and verify the current value of `instance_id` and build a state
/// view on its root.
///
/// Nothing is decoded from a proof that fails verification.
pub async fn fetch_snapshot<C: LedgerClient>(
    client: &Arc<C>,
    instance_id: InstanceId,
) -> BridgeResult<StateSnapshot<C>> {
    let proof = client.get_proof(&instance_id).await?;

    proof.verify(client.ledger_identity()).map_err(|e| match e {
        LedgerError::ProofVerification(reason) => BridgeError::ProofVerification(reason),
        other => BridgeError::ProofVerification(other.to_string()),
    })?;

    if proof.key != instance_id {
        return Err(BridgeError::ProofVerification(format!(
            "proof is for instance {}, not {}",
            proof.key, instance_id
        )));
    }

    let (_, value, contract_id, _) = proof.key_value()?;
    if contract_id != EVM_CONTRACT_ID {
        return Err(BridgeError::Decoding(format!(
            "instance {instance_id} holds a {contract_id} contract"
        )));
    }
    let state = EvmStateValue::decode(value)?;

    let runtime = Handle::try_current().map_err(|e| BridgeError::Engine(e.to_string()))?;
    tracing::debug!(
        "Snapshot of {} at block {} with root {}",
        instance_id, proof.header.index, state.root_hash
    );

    Ok(StateSnapshot {
        instance_id,
        block_index: proof.header.index,
        view: StateView::new(
            LedgerNodeSource {
                client: Arc::clone(client),
                instance_id,
                runtime,
            },
            state.root_hash,
        ),
    })
}
