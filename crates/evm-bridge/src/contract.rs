// evm-bridge/src/contract.rs

use crate::{
    account::{from_eth_u256, from_h160},
    engine::settle,
    state::{node_instance_id, EvmStateValue, StateView, StateWriter},
    nodes::NodeSource,
    BridgeError, BridgeResult, Engine, EngineConfig,
};
use bridge_crypto::{Hash, RecoverableSignature};
use ethers_core::types::{NameOrAddress, Signature as EthSignature, TransactionRequest, U64};
use ethers_core::utils::rlp::Rlp;
use ledger::{
    Arguments, Contract, InstanceId, Instruction, Invoke, LedgerError, LedgerResult, ReadOnlyState,
    Spawn, StateChange,
};
use revm::primitives::{Address, Bytes, ResultAndState, TxEnv, TxKind, U256};
use std::collections::BTreeMap;

/// Contract id of instances hosting EVM state
pub const EVM_CONTRACT_ID: &str = "bevm";

/// Contract id of the instances holding trie nodes and code. No contract is
/// registered under it, so they cannot be invoked.
pub const EVM_NODE_CONTRACT_ID: &str = "bevm_node";

/// Commands understood by [`EvmContract::invoke`]
pub const COMMAND_TRANSACTION: &str = "transaction";
pub const COMMAND_CREDIT: &str = "credit";

/// Ledger-side logic of EVM instances.
///
/// Executes committed transactions with the engine and stores the resulting
/// state trie in the ledger, one instance per node. Transactions that revert,
/// halt or are invalid are refused, so they never consume a nonce.
pub struct EvmContract {
    engine: Engine,
}

/// Trie nodes of one EVM instance as found in the ledger state
struct LedgerNodes<'a> {
    state: &'a dyn ReadOnlyState,
    instance: InstanceId,
}

impl NodeSource for LedgerNodes<'_> {
    fn node(&self, hash: &Hash) -> BridgeResult<Option<Vec<u8>>> {
        let id = node_instance_id(&self.instance, hash);
        Ok(self.state.get(&id).map(|entry| entry.value.clone()))
    }
}

fn refuse(e: BridgeError) -> LedgerError {
    LedgerError::Contract(e.to_string())
}

impl EvmContract {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config),
        }
    }

    fn execute_transaction(
        &self,
        nodes: &LedgerNodes<'_>,
        root: Hash,
        args: &Arguments,
    ) -> BridgeResult<(Hash, BTreeMap<Hash, Vec<u8>>)> {
        let raw = args
            .search("tx")
            .ok_or_else(|| BridgeError::Decoding("missing argument tx".into()))?;
        let tx = decode_transaction(raw)?;
        let gas_limit = tx.gas_limit;
        let caller = tx.caller;

        let view = StateView::new(nodes, root);
        let ResultAndState { result, state } = self.engine.transact(view, tx)?;
        let outcome = settle(result, gas_limit)?;

        let mut writer = StateWriter::new(nodes, root);
        writer.apply(state)?;

        match outcome.created {
            Some(address) => tracing::info!("{} created contract {}", caller, address),
            None => tracing::debug!("Executed transaction from {} ({} gas)", caller, outcome.gas_used),
        }
        writer.finish()
    }

    fn credit(
        &self,
        nodes: &LedgerNodes<'_>,
        root: Hash,
        args: &Arguments,
    ) -> BridgeResult<(Hash, BTreeMap<Hash, Vec<u8>>)> {
        let address = args
            .search("address")
            .filter(|bytes| bytes.len() == 20)
            .map(Address::from_slice)
            .ok_or_else(|| BridgeError::Decoding("argument address must be 20 bytes".into()))?;
        let amount = args
            .search("amount")
            .and_then(U256::try_from_be_slice)
            .ok_or_else(|| BridgeError::Decoding("argument amount must be at most 32 bytes".into()))?;

        let mut writer = StateWriter::new(nodes, root);
        let balance = writer.credit(address, amount)?;
        tracing::info!("Credited {} wei to {} (balance {})", amount, address, balance);
        writer.finish()
    }
}

/// Decode a signed legacy transaction and recover its sender
fn decode_transaction(raw: &[u8]) -> BridgeResult<TxEnv> {
    let (mut request, signature) = TransactionRequest::decode_signed_rlp(&Rlp::new(raw))
        .map_err(|e| BridgeError::Decoding(format!("signed transaction: {e}")))?;
    if request.chain_id.is_none() && signature.v >= 35 {
        request.chain_id = Some(U64::from((signature.v - 35) / 2));
    }
    let caller = recover_sender(&request, &signature)?;

    let transact_to = match &request.to {
        None => TxKind::Create,
        Some(NameOrAddress::Address(to)) => TxKind::Call(from_h160(*to)),
        Some(NameOrAddress::Name(name)) => {
            return Err(BridgeError::Decoding(format!("unresolved destination {name}")))
        }
    };

    let gas = request.gas.unwrap_or_default();
    if gas.bits() > 64 {
        return Err(BridgeError::Decoding(format!("gas limit {gas} out of range")));
    }
    let nonce = request.nonce.unwrap_or_default();
    if nonce.bits() > 64 {
        return Err(BridgeError::Decoding(format!("nonce {nonce} out of range")));
    }

    Ok(TxEnv {
        caller,
        gas_limit: gas.as_u64(),
        gas_price: from_eth_u256(request.gas_price.unwrap_or_default()),
        transact_to,
        value: from_eth_u256(request.value.unwrap_or_default()),
        data: Bytes::from(request.data.map(|data| data.to_vec()).unwrap_or_default()),
        nonce: Some(nonce.as_u64()),
        chain_id: request.chain_id.map(|id| id.as_u64()),
        ..Default::default()
    })
}

fn recover_sender(request: &TransactionRequest, signature: &EthSignature) -> BridgeResult<Address> {
    let recovery_id = match signature.v {
        27 | 28 => signature.v - 27,
        v if v >= 35 => (v - 35) % 2,
        v => return Err(BridgeError::Signing(format!("unsupported signature v = {v}"))),
    };

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    signature.r.to_big_endian(&mut r);
    signature.s.to_big_endian(&mut s);
    let recoverable = RecoverableSignature {
        r,
        s,
        recovery_id: recovery_id as u8,
    };

    let sender = recoverable.recover_address(&request.sighash().0)?;
    Ok(Address::from(sender))
}

impl Contract for EvmContract {
    fn spawn(
        &self,
        _state: &dyn ReadOnlyState,
        instruction: &Instruction,
        _spawn: &Spawn,
    ) -> LedgerResult<Vec<StateChange>> {
        let id = instruction.derive_id("");
        tracing::info!("Spawning EVM instance {}", id);
        Ok(vec![StateChange::Create {
            id,
            contract_id: EVM_CONTRACT_ID.into(),
            value: EvmStateValue::empty().encode().map_err(refuse)?,
        }])
    }

    fn invoke(
        &self,
        state: &dyn ReadOnlyState,
        instruction: &Instruction,
        invoke: &Invoke,
    ) -> LedgerResult<Vec<StateChange>> {
        let instance = instruction.instance_id;
        let current = state
            .get(&instance)
            .ok_or(LedgerError::MissingInstance(instance))?;
        let root = EvmStateValue::decode(&current.value).map_err(refuse)?.root_hash;
        let nodes = LedgerNodes { state, instance };

        let (root, written) = match invoke.command.as_str() {
            COMMAND_TRANSACTION => self.execute_transaction(&nodes, root, &invoke.args),
            COMMAND_CREDIT => self.credit(&nodes, root, &invoke.args),
            other => return Err(LedgerError::Contract(format!("unknown command {other}"))),
        }
        .map_err(|e| {
            tracing::warn!("Refusing {} on {}: {}", invoke.command, instance, e);
            refuse(e)
        })?;

        let mut changes: Vec<StateChange> = written
            .into_iter()
            .map(|(hash, bytes)| (node_instance_id(&instance, &hash), bytes))
            .filter(|(id, _)| state.get(id).is_none())
            .map(|(id, value)| StateChange::Create {
                id,
                contract_id: EVM_NODE_CONTRACT_ID.into(),
                value,
            })
            .collect();
        changes.push(StateChange::Update {
            id: instance,
            value: EvmStateValue { root_hash: root }.encode().map_err(refuse)?,
        });

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::storage_descriptor;
    use crate::{EvmAccount, Token};
    use ethers_core::types::U256 as AbiU256;
    use ledger::StateEntry;

    type Entries = BTreeMap<InstanceId, StateEntry>;

    fn apply(entries: &mut Entries, changes: Vec<StateChange>) {
        for change in changes {
            match change {
                StateChange::Create { id, contract_id, value } => {
                    assert!(entries.insert(id, StateEntry { value, contract_id, version: 0 }).is_none());
                }
                StateChange::Update { id, value } => {
                    let entry = entries.get_mut(&id).unwrap();
                    entry.value = value;
                    entry.version += 1;
                }
                StateChange::Remove { id } => {
                    entries.remove(&id);
                }
            }
        }
    }

    fn spawned(contract: &EvmContract, entries: &mut Entries) -> InstanceId {
        let instruction = Instruction::spawn(InstanceId::new([0u8; 32]), EVM_CONTRACT_ID, Arguments::new());
        let ledger::Action::Spawn(spawn) = &instruction.action else {
            unreachable!()
        };
        let changes = contract.spawn(entries, &instruction, spawn).unwrap();
        apply(entries, changes);
        instruction.derive_id("")
    }

    fn invoke(
        contract: &EvmContract,
        entries: &mut Entries,
        id: InstanceId,
        command: &str,
        args: Arguments,
    ) -> LedgerResult<()> {
        let instruction = Instruction::invoke(id, EVM_CONTRACT_ID, command, args);
        let ledger::Action::Invoke(call) = &instruction.action else {
            unreachable!()
        };
        let changes = contract.invoke(entries, &instruction, call)?;
        apply(entries, changes);
        Ok(())
    }

    fn view(entries: &Entries, id: InstanceId) -> StateView<LedgerNodes<'_>> {
        let root = EvmStateValue::decode(&entries[&id].value).unwrap().root_hash;
        StateView::new(LedgerNodes { state: entries, instance: id }, root)
    }

    fn credit_args(address: Address, amount: u64) -> Arguments {
        Arguments::new()
            .with("address", address.to_vec())
            .with("amount", U256::from(amount).to_be_bytes::<32>().to_vec())
    }

    fn deploy_tx(account: &EvmAccount, nonce: u64) -> Vec<u8> {
        let payload = storage_descriptor()
            .creation_payload(&[Token::Uint(AbiU256::from(7u64))])
            .unwrap();
        let request = TransactionRequest::new()
            .nonce(nonce)
            .value(0u64)
            .gas(1_000_000u64)
            .gas_price(1u64)
            .data(payload);
        account.sign_and_serialize(&request).unwrap()
    }

    #[test]
    fn test_spawn_creates_empty_state() {
        let contract = EvmContract::new(EngineConfig::default());
        let mut entries = Entries::new();
        let id = spawned(&contract, &mut entries);

        assert_eq!(entries[&id].contract_id, EVM_CONTRACT_ID);
        assert_eq!(EvmStateValue::decode(&entries[&id].value).unwrap(), EvmStateValue::empty());
    }

    #[test]
    fn test_credit() {
        let contract = EvmContract::new(EngineConfig::default());
        let mut entries = Entries::new();
        let id = spawned(&contract, &mut entries);
        let alice = Address::repeat_byte(0xaa);

        invoke(&contract, &mut entries, id, COMMAND_CREDIT, credit_args(alice, 1000)).unwrap();
        invoke(&contract, &mut entries, id, COMMAND_CREDIT, credit_args(alice, 234)).unwrap();

        assert_eq!(view(&entries, id).balance(alice).unwrap(), U256::from(1234u64));
        assert_eq!(entries[&id].version, 2);
    }

    #[test]
    fn test_malformed_credit_refused() {
        let contract = EvmContract::new(EngineConfig::default());
        let mut entries = Entries::new();
        let id = spawned(&contract, &mut entries);

        let args = Arguments::new().with("address", vec![1, 2, 3]).with("amount", vec![1]);
        assert!(matches!(
            invoke(&contract, &mut entries, id, COMMAND_CREDIT, args),
            Err(LedgerError::Contract(_))
        ));
        assert!(invoke(&contract, &mut entries, id, "mint", Arguments::new()).is_err());
    }

    #[test]
    fn test_transaction_deploys_contract() {
        let contract = EvmContract::new(EngineConfig::default());
        let mut entries = Entries::new();
        let id = spawned(&contract, &mut entries);
        let account = EvmAccount::generate().unwrap();
        invoke(&contract, &mut entries, id, COMMAND_CREDIT, credit_args(account.address(), 10_000_000)).unwrap();

        let args = Arguments::new().with("tx", deploy_tx(&account, 0));
        invoke(&contract, &mut entries, id, COMMAND_TRANSACTION, args).unwrap();

        let state = view(&entries, id);
        assert_eq!(state.nonce(account.address()).unwrap(), 1);
        let created = state.account(account.address().create(0)).unwrap().unwrap();
        assert!(created.has_code());
        // Every node instance belongs to the node contract
        assert!(entries
            .iter()
            .filter(|(key, _)| **key != id)
            .all(|(_, entry)| entry.contract_id == EVM_NODE_CONTRACT_ID));
    }

    #[test]
    fn test_replayed_transaction_refused() {
        let contract = EvmContract::new(EngineConfig::default());
        let mut entries = Entries::new();
        let id = spawned(&contract, &mut entries);
        let account = EvmAccount::generate().unwrap();
        invoke(&contract, &mut entries, id, COMMAND_CREDIT, credit_args(account.address(), 10_000_000)).unwrap();

        let raw = deploy_tx(&account, 0);
        invoke(&contract, &mut entries, id, COMMAND_TRANSACTION, Arguments::new().with("tx", raw.clone())).unwrap();
        let before = entries[&id].clone();

        assert!(invoke(&contract, &mut entries, id, COMMAND_TRANSACTION, Arguments::new().with("tx", raw)).is_err());
        assert_eq!(entries[&id], before);
    }

    #[test]
    fn test_garbage_transaction_refused() {
        let contract = EvmContract::new(EngineConfig::default());
        let mut entries = Entries::new();
        let id = spawned(&contract, &mut entries);

        let args = Arguments::new().with("tx", vec![0xc0, 0x01]);
        assert!(invoke(&contract, &mut entries, id, COMMAND_TRANSACTION, args).is_err());
    }
}
