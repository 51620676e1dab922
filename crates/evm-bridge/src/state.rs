// evm-bridge/src/state.rs

use crate::{
    account::{from_eth_u256, to_eth_u256},
    nodes::{self, trie_error, NodeSource, NodeStore, StateTrie, EMPTY_ROOT},
    BridgeError, BridgeResult,
};
use bridge_crypto::{keccak256, Hash};
use eth_trie::Trie;
use ethers_core::types::{H256, U256 as EthU256};
use ethers_core::utils::rlp::{self, DecoderError, Rlp, RlpStream};
use ledger::InstanceId;
use revm::primitives::{Account, AccountInfo, Address, Bytecode, Bytes, B256, KECCAK_EMPTY, U256};
use revm::DatabaseRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Value of the ledger instance hosting EVM state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmStateValue {
    pub root_hash: Hash,
}

impl EvmStateValue {
    pub fn empty() -> Self {
        Self {
            root_hash: EMPTY_ROOT,
        }
    }

    pub fn encode(&self) -> BridgeResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BridgeError::Encoding(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> BridgeResult<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| BridgeError::Decoding(format!("EVM state value: {e}")))
    }
}

/// Account entry of the state trie, keyed by `keccak(address)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub nonce: u64,
    /// Big-endian wei
    pub balance: [u8; 32],
    pub code_hash: Hash,
    pub storage_root: Hash,
}

impl AccountRecord {
    pub fn empty() -> Self {
        Self {
            nonce: 0,
            balance: [0u8; 32],
            code_hash: Hash::new(KECCAK_EMPTY.0),
            storage_root: EMPTY_ROOT,
        }
    }

    pub fn balance(&self) -> U256 {
        U256::from_be_bytes(self.balance)
    }

    pub fn set_balance(&mut self, balance: U256) {
        self.balance = balance.to_be_bytes::<32>();
    }

    pub fn has_code(&self) -> bool {
        self.code_hash.as_bytes() != KECCAK_EMPTY.as_slice()
    }

    /// Ethereum account encoding, `[nonce, balance, storage_root, code_hash]`
    pub fn rlp_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(4);
        stream.append(&self.nonce);
        stream.append(&to_eth_u256(self.balance()));
        stream.append(&H256(self.storage_root.to_bytes()));
        stream.append(&H256(self.code_hash.to_bytes()));
        stream.out().to_vec()
    }

    pub fn from_rlp(bytes: &[u8]) -> BridgeResult<Self> {
        let invalid = |e: DecoderError| BridgeError::Decoding(format!("account record: {e}"));

        let rlp = Rlp::new(bytes);
        if rlp.item_count().map_err(invalid)? != 4 {
            return Err(BridgeError::Decoding("account record: expected 4 fields".into()));
        }
        let balance: EthU256 = rlp.val_at(1).map_err(invalid)?;
        let storage_root: H256 = rlp.val_at(2).map_err(invalid)?;
        let code_hash: H256 = rlp.val_at(3).map_err(invalid)?;

        let mut record = Self {
            nonce: rlp.val_at(0).map_err(invalid)?,
            balance: [0u8; 32],
            storage_root: Hash::new(storage_root.0),
            code_hash: Hash::new(code_hash.0),
        };
        record.set_balance(from_eth_u256(balance));
        Ok(record)
    }
}

/// Ledger instance holding the trie node (or code blob) `hash` of the EVM
/// state hosted by `evm_instance`
pub fn node_instance_id(evm_instance: &InstanceId, hash: &Hash) -> InstanceId {
    InstanceId::derive(&[evm_instance.as_bytes(), hash.as_bytes()])
}

fn account_key(address: Address) -> Hash {
    keccak256(address.as_slice())
}

fn slot_key(slot: U256) -> Hash {
    keccak256(&slot.to_be_bytes::<32>())
}

fn read_account<S: NodeSource>(
    trie: &StateTrie<S>,
    address: Address,
) -> BridgeResult<Option<AccountRecord>> {
    trie.get(account_key(address).as_bytes())
        .map_err(trie_error)?
        .map(|bytes| AccountRecord::from_rlp(&bytes))
        .transpose()
}

/// Read-only view of the state under one root, implementing the engine's
/// database interface
pub struct StateView<S> {
    store: Arc<NodeStore<S>>,
    root: Hash,
    accounts: Mutex<HashMap<Address, Option<AccountRecord>>>,
}

impl<S: NodeSource> StateView<S> {
    pub fn new(source: S, root: Hash) -> Self {
        Self {
            store: Arc::new(NodeStore::new(source)),
            root,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn account(&self, address: Address) -> BridgeResult<Option<AccountRecord>> {
        let mut cache = self
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(&address) {
            return Ok(cached.clone());
        }

        let record = read_account(&nodes::open(&self.store, self.root), address)?;
        cache.insert(address, record.clone());
        Ok(record)
    }

    pub fn balance(&self, address: Address) -> BridgeResult<U256> {
        Ok(self
            .account(address)?
            .map(|record| record.balance())
            .unwrap_or(U256::ZERO))
    }

    pub fn nonce(&self, address: Address) -> BridgeResult<u64> {
        Ok(self.account(address)?.map(|record| record.nonce).unwrap_or(0))
    }

    fn code(&self, code_hash: &Hash) -> BridgeResult<Bytecode> {
        let bytes = self
            .store
            .load(code_hash)?
            .ok_or_else(|| BridgeError::Ledger(format!("code {code_hash} not found")))?;
        Ok(Bytecode::new_raw(Bytes::from(bytes)))
    }
}

impl<S: NodeSource> DatabaseRef for StateView<S> {
    type Error = BridgeError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let Some(record) = self.account(address)? else {
            return Ok(None);
        };

        let code = if record.has_code() {
            Some(self.code(&record.code_hash)?)
        } else {
            None
        };

        Ok(Some(AccountInfo {
            balance: record.balance(),
            nonce: record.nonce,
            code_hash: B256::from(record.code_hash.to_bytes()),
            code,
        }))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::new());
        }
        self.code(&Hash::new(code_hash.0))
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let Some(record) = self.account(address)? else {
            return Ok(U256::ZERO);
        };

        let storage = nodes::open(&self.store, record.storage_root);
        match storage.get(slot_key(index).as_bytes()).map_err(trie_error)? {
            Some(bytes) => {
                let word: EthU256 = rlp::decode(&bytes).map_err(|e| {
                    BridgeError::Decoding(format!("storage slot {index} of {address}: {e}"))
                })?;
                Ok(from_eth_u256(word))
            }
            None => Ok(U256::ZERO),
        }
    }

    /// `BLOCKHASH` is synthetic: the instance keeps no block history, so
    /// every block hash reads as zero
    fn block_hash_ref(&self, _number: u64) -> Result<B256, Self::Error> {
        Ok(B256::ZERO)
    }
}

/// Accumulates state changes on top of a committed root
pub struct StateWriter<S: NodeSource> {
    store: Arc<NodeStore<S>>,
    accounts: StateTrie<S>,
}

impl<S: NodeSource> StateWriter<S> {
    pub fn new(source: S, root: Hash) -> Self {
        let store = Arc::new(NodeStore::new(source));
        let accounts = nodes::open(&store, root);
        Self { store, accounts }
    }

    pub fn account(&self, address: Address) -> BridgeResult<Option<AccountRecord>> {
        read_account(&self.accounts, address)
    }

    pub fn put_account(&mut self, address: Address, record: &AccountRecord) -> BridgeResult<()> {
        self.accounts
            .insert(account_key(address).as_bytes(), &record.rlp_bytes())
            .map_err(trie_error)
    }

    fn remove_account(&mut self, address: Address) -> BridgeResult<()> {
        self.accounts
            .remove(account_key(address).as_bytes())
            .map_err(trie_error)?;
        Ok(())
    }

    /// Add `amount` to the balance of `address`, creating the account if
    /// needed. Returns the new balance.
    pub fn credit(&mut self, address: Address, amount: U256) -> BridgeResult<U256> {
        let mut record = self.account(address)?.unwrap_or_else(AccountRecord::empty);
        let balance = record
            .balance()
            .checked_add(amount)
            .ok_or_else(|| BridgeError::Rejected(format!("balance of {address} would overflow")))?;
        record.set_balance(balance);
        self.put_account(address, &record)?;
        Ok(balance)
    }

    /// Write `values` into the storage trie rooted at `root`; zero values
    /// clear their slot. Returns the new storage root.
    pub fn write_storage(
        &mut self,
        root: Hash,
        values: impl IntoIterator<Item = (U256, U256)>,
    ) -> BridgeResult<Hash> {
        let mut storage = nodes::open(&self.store, root);
        for (index, value) in values {
            let key = slot_key(index);
            if value.is_zero() {
                storage.remove(key.as_bytes()).map_err(trie_error)?;
            } else {
                storage
                    .insert(key.as_bytes(), &rlp::encode(&to_eth_u256(value)))
                    .map_err(trie_error)?;
            }
        }
        nodes::commit(&mut storage)
    }

    /// Store contract code under its hash
    pub fn put_code(&mut self, code: Vec<u8>) -> Hash {
        self.store.put_blob(code)
    }

    /// Fold the accounts touched by one execution into the trie
    pub fn apply(&mut self, changes: impl IntoIterator<Item = (Address, Account)>) -> BridgeResult<()> {
        // Sorted so every replica writes the same nodes
        let mut changes: Vec<(Address, Account)> = changes.into_iter().collect();
        changes.sort_by_key(|(address, _)| *address);

        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }

            let existing = self.account(address)?;
            if account.is_selfdestructed() {
                if existing.is_some() {
                    self.remove_account(address)?;
                }
                continue;
            }
            if existing.is_none() && account.info.is_empty() && account.storage.is_empty() {
                continue;
            }

            let mut record = match existing {
                Some(record) if !account.is_created() => record,
                _ => AccountRecord::empty(),
            };
            record.nonce = account.info.nonce;
            record.set_balance(account.info.balance);

            let code_hash = Hash::new(account.info.code_hash.0);
            if code_hash != record.code_hash && account.info.code_hash != KECCAK_EMPTY {
                let code = account.info.code.as_ref().ok_or_else(|| {
                    BridgeError::Engine(format!("code of {address} missing from execution result"))
                })?;
                record.code_hash = self.put_code(code.original_bytes().to_vec());
            }

            let mut slots: Vec<(U256, U256)> = account
                .storage
                .iter()
                .filter(|(_, slot)| slot.is_changed())
                .map(|(index, slot)| (*index, slot.present_value))
                .collect();
            if !slots.is_empty() {
                slots.sort();
                record.storage_root = self.write_storage(record.storage_root, slots)?;
            }

            self.put_account(address, &record)?;
        }

        Ok(())
    }

    /// The new root and every node (and code blob) written to reach it
    pub fn finish(mut self) -> BridgeResult<(Hash, BTreeMap<Hash, Vec<u8>>)> {
        let root = nodes::commit(&mut self.accounts)?;
        Ok((root, self.store.take_pending()))
    }
}
