// ledger/src/memory.rs

use crate::{
    types::BlockIndex, Action, BlockHeader, ClientTransaction, Contract, Identity, InstanceId,
    Instruction, LedgerClient, LedgerError, LedgerIdentity, LedgerResult, Proof, Receipt,
    StateChange, StateEntry,
};
use async_trait::async_trait;
use bridge_crypto::{hash::Hashable, Hash, KeyPair, MerkleTree, Signature, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Contract id of the genesis authorization instance
pub const AUTHORIZATION_CONTRACT_ID: &str = "darc";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLedgerConfig {
    /// Time between two blocks; bounds how long a submission waits
    pub block_interval_ms: u64,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 1000,
        }
    }
}

struct CommittedBlock {
    header: BlockHeader,
    signature: Signature,
    tree: MerkleTree,
    positions: HashMap<InstanceId, usize>,
}

struct LedgerState {
    entries: BTreeMap<InstanceId, StateEntry>,
    counters: HashMap<Identity, u64>,
    block: CommittedBlock,
}

/// In-process ledger: one block per accepted transaction, signed by a local
/// collective key, with Merkle proofs over the full instance table.
///
/// Only the admin identities given at genesis may sign instructions.
pub struct MemoryLedger {
    identity: LedgerIdentity,
    collective: KeyPair,
    config: MemoryLedgerConfig,
    genesis_id: InstanceId,
    admins: Vec<Identity>,
    contracts: HashMap<String, Arc<dyn Contract>>,
    state: RwLock<LedgerState>,
    producing: AtomicBool,
}

impl MemoryLedger {
    /// Create a ledger whose genesis authorization instance lists `admins`
    pub fn new(config: MemoryLedgerConfig, admins: Vec<Identity>) -> LedgerResult<Self> {
        let collective = KeyPair::generate(SignatureScheme::Ed25519)?;

        let mut seed = b"memory-ledger".to_vec();
        seed.extend_from_slice(collective.public_key().as_bytes());
        let ledger_id = seed.hash();
        let genesis_id = InstanceId::derive(&[ledger_id.as_bytes(), b"genesis"]);

        let mut entries = BTreeMap::new();
        entries.insert(genesis_id, StateEntry {
            value: bincode::serialize(&admins)?,
            contract_id: AUTHORIZATION_CONTRACT_ID.into(),
            version: 0,
        });
        let block = Self::seal(&collective, ledger_id, 0, &entries)?;

        tracing::info!("Memory ledger {} started with {} admin(s)", ledger_id, admins.len());

        Ok(Self {
            identity: LedgerIdentity {
                id: ledger_id,
                collective_key: collective.public_key().clone(),
            },
            collective,
            config,
            genesis_id,
            admins,
            contracts: HashMap::new(),
            state: RwLock::new(LedgerState {
                entries,
                counters: HashMap::new(),
                block,
            }),
            producing: AtomicBool::new(true),
        })
    }

    /// Register the logic executed for instances of `contract_id`
    pub fn with_contract(mut self, contract_id: &str, contract: Arc<dyn Contract>) -> Self {
        self.contracts.insert(contract_id.to_string(), contract);
        self
    }

    /// Base instance for spawning new instances
    pub fn genesis_instance_id(&self) -> InstanceId {
        self.genesis_id
    }

    pub fn config(&self) -> &MemoryLedgerConfig {
        &self.config
    }

    pub async fn block_index(&self) -> BlockIndex {
        self.state.read().await.block.header.index
    }

    /// Stop including transactions; submissions time out until resumed
    pub fn halt_block_production(&self) {
        self.producing.store(false, Ordering::SeqCst);
    }

    pub fn resume_block_production(&self) {
        self.producing.store(true, Ordering::SeqCst);
    }

    fn seal(
        collective: &KeyPair,
        ledger_id: Hash,
        index: BlockIndex,
        entries: &BTreeMap<InstanceId, StateEntry>,
    ) -> LedgerResult<CommittedBlock> {
        let leaves = entries
            .iter()
            .map(|(id, entry)| entry.leaf_bytes(id))
            .collect::<LedgerResult<Vec<_>>>()?;
        let tree = MerkleTree::new(&leaves)?;
        let positions = entries
            .keys()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();

        let header = BlockHeader {
            ledger_id,
            index,
            entries_root: tree.root(),
        };
        let signature = collective.sign(header.hash()?.as_bytes())?;

        Ok(CommittedBlock {
            header,
            signature,
            tree,
            positions,
        })
    }

    /// Run every instruction against a copy of the state. Nothing is kept
    /// unless all of them succeed.
    fn execute(
        &self,
        state: &LedgerState,
        tx: &ClientTransaction,
    ) -> LedgerResult<(BTreeMap<InstanceId, StateEntry>, HashMap<Identity, u64>)> {
        if tx.instructions.is_empty() {
            return Err(LedgerError::Rejected("empty transaction".into()));
        }

        let digest = tx.hash();
        let mut entries = state.entries.clone();
        let mut counters = state.counters.clone();

        for (i, instruction) in tx.instructions.iter().enumerate() {
            self.check_signers(instruction, &digest, &mut counters)
                .and_then(|_| self.dispatch(&entries, instruction))
                .and_then(|changes| apply_changes(&mut entries, changes))
                .map_err(|e| LedgerError::Rejected(format!("instruction {i}: {e}")))?;
        }

        Ok((entries, counters))
    }

    fn check_signers(
        &self,
        instruction: &Instruction,
        digest: &Hash,
        counters: &mut HashMap<Identity, u64>,
    ) -> LedgerResult<()> {
        let signers = instruction.signer_identities.len();
        if signers == 0
            || instruction.signer_counter.len() != signers
            || instruction.signatures.len() != signers
        {
            return Err(LedgerError::Rejected("signers, counters and signatures do not line up".into()));
        }

        let stamped = instruction
            .signer_identities
            .iter()
            .zip(&instruction.signer_counter)
            .zip(&instruction.signatures);
        for ((identity, counter), signature) in stamped {
            if !self.admins.contains(identity) {
                return Err(LedgerError::Rejected(format!("{identity} is not authorized")));
            }

            let expected = counters.get(identity).copied().unwrap_or(0) + 1;
            if *counter != expected {
                return Err(LedgerError::Rejected(format!(
                    "wrong replay counter for {identity}: got {counter}, expected {expected}"
                )));
            }

            if !identity.public_key().verify(digest.as_bytes(), signature)? {
                return Err(LedgerError::Rejected(format!("invalid signature from {identity}")));
            }

            counters.insert(identity.clone(), *counter);
        }

        Ok(())
    }

    fn dispatch(
        &self,
        entries: &BTreeMap<InstanceId, StateEntry>,
        instruction: &Instruction,
    ) -> LedgerResult<Vec<StateChange>> {
        let id = instruction.instance_id;
        match &instruction.action {
            Action::Spawn(spawn) => {
                if !entries.contains_key(&id) {
                    return Err(LedgerError::MissingInstance(id));
                }
                self.contract(&spawn.contract_id)?.spawn(entries, instruction, spawn)
            }
            Action::Invoke(invoke) => {
                let entry = entries.get(&id).ok_or(LedgerError::MissingInstance(id))?;
                if entry.contract_id != invoke.contract_id {
                    return Err(LedgerError::Rejected(format!(
                        "instance {id} belongs to contract {}, not {}",
                        entry.contract_id, invoke.contract_id
                    )));
                }
                self.contract(&invoke.contract_id)?.invoke(entries, instruction, invoke)
            }
        }
    }

    fn contract(&self, contract_id: &str) -> LedgerResult<&Arc<dyn Contract>> {
        self.contracts
            .get(contract_id)
            .ok_or_else(|| LedgerError::Rejected(format!("unknown contract {contract_id}")))
    }
}

fn apply_changes(
    entries: &mut BTreeMap<InstanceId, StateEntry>,
    changes: Vec<StateChange>,
) -> LedgerResult<()> {
    for change in changes {
        match change {
            StateChange::Create { id, contract_id, value } => {
                if entries.contains_key(&id) {
                    return Err(LedgerError::Rejected(format!("instance {id} already exists")));
                }
                entries.insert(id, StateEntry {
                    value,
                    contract_id,
                    version: 0,
                });
            }
            StateChange::Update { id, value } => {
                let entry = entries.get_mut(&id).ok_or(LedgerError::MissingInstance(id))?;
                entry.value = value;
                entry.version += 1;
            }
            StateChange::Remove { id } => {
                entries.remove(&id).ok_or(LedgerError::MissingInstance(id))?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn ledger_identity(&self) -> &LedgerIdentity {
        &self.identity
    }

    async fn get_proof(&self, key: &InstanceId) -> LedgerResult<Proof> {
        let state = self.state.read().await;
        let block = &state.block;

        let entry = match (state.entries.get(key), block.positions.get(key)) {
            (Some(entry), Some(&position)) => Some((entry.clone(), block.tree.proof(position)?)),
            _ => None,
        };

        Ok(Proof {
            header: block.header.clone(),
            signature: block.signature.clone(),
            key: *key,
            entry,
        })
    }

    async fn get_signer_counters(&self, identities: &[Identity]) -> LedgerResult<Vec<u64>> {
        let state = self.state.read().await;
        Ok(identities
            .iter()
            .map(|identity| state.counters.get(identity).copied().unwrap_or(0))
            .collect())
    }

    async fn submit_transaction_and_wait(
        &self,
        tx: ClientTransaction,
        max_block_intervals: u32,
    ) -> LedgerResult<Receipt> {
        if !self.producing.load(Ordering::SeqCst) {
            let wait = self
                .config
                .block_interval_ms
                .saturating_mul(u64::from(max_block_intervals));
            tokio::time::sleep(Duration::from_millis(wait)).await;
            tracing::warn!(
                "Transaction {} not included after {} block intervals",
                tx.hash(), max_block_intervals
            );
            return Err(LedgerError::CommitTimeout {
                blocks: max_block_intervals,
            });
        }

        let mut state = self.state.write().await;
        let (entries, counters) = match self.execute(&state, &tx) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!("Rejected transaction {}: {}", tx.hash(), e);
                return Err(e);
            }
        };

        let index = state.block.header.index + 1;
        let block = Self::seal(&self.collective, self.identity.id, index, &entries)?;
        state.entries = entries;
        state.counters = counters;
        state.block = block;

        tracing::debug!(
            "Committed block {} with {} instruction(s)",
            index, tx.instructions.len()
        );

        Ok(Receipt {
            block_index: index,
            tx_hash: tx.hash(),
        })
    }
}
