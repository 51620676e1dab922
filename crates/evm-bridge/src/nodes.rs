// evm-bridge/src/nodes.rs

//! Content-addressed storage behind the state tries.
//!
//! Tries are `eth_trie` Merkle-Patricia tries opened over a [`NodeStore`].
//! The store reads through to a [`NodeSource`] and keeps every write pending
//! until the caller persists it. Values are keyed by their Keccak-256 hash,
//! which is checked for everything coming from the source.

use crate::{BridgeError, BridgeResult};
use bridge_crypto::{keccak256, Hash};
use eth_trie::{EthTrie, Trie, TrieError, DB};
use keccak_hash::{H256, KECCAK_NULL_RLP};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Root of a trie without entries, `keccak(rlp(""))`
pub const EMPTY_ROOT: Hash = Hash::new(KECCAK_NULL_RLP.0);

/// Where committed trie nodes and code are read from
pub trait NodeSource: Send + Sync {
    fn node(&self, hash: &Hash) -> BridgeResult<Option<Vec<u8>>>;
}

impl<T: NodeSource + ?Sized> NodeSource for &T {
    fn node(&self, hash: &Hash) -> BridgeResult<Option<Vec<u8>>> {
        (**self).node(hash)
    }
}

impl NodeSource for BTreeMap<Hash, Vec<u8>> {
    fn node(&self, hash: &Hash) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.get(hash).cloned())
    }
}

/// Node database handed to `eth_trie`
pub struct NodeStore<S> {
    source: S,
    pending: RwLock<BTreeMap<Hash, Vec<u8>>>,
}

impl<S: NodeSource> NodeStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Value stored under `hash`, pending writes first
    pub fn load(&self, hash: &Hash) -> BridgeResult<Option<Vec<u8>>> {
        let pending = self.pending.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bytes) = pending.get(hash) {
            return Ok(Some(bytes.clone()));
        }
        drop(pending);

        match self.source.node(hash)? {
            Some(bytes) if keccak256(&bytes) != *hash => Err(BridgeError::ProofVerification(
                format!("stored value does not match its hash {hash}"),
            )),
            found => Ok(found),
        }
    }

    /// Store a blob (contract code) under its hash
    pub fn put_blob(&self, bytes: Vec<u8>) -> Hash {
        let hash = keccak256(&bytes);
        self.write(hash, bytes);
        hash
    }

    /// Drain everything written so far, by hash
    pub fn take_pending(&self) -> BTreeMap<Hash, Vec<u8>> {
        let mut pending = self.pending.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *pending)
    }

    fn write(&self, hash: Hash, bytes: Vec<u8>) {
        self.pending
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(hash, bytes);
    }
}

impl<S: NodeSource> DB for NodeStore<S> {
    type Error = BridgeError;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        self.load(&Hash::from_slice(key)?)
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), Self::Error> {
        self.write(Hash::from_slice(key)?, value);
        Ok(())
    }

    /// Nodes may be shared by several roots and older roots stay readable,
    /// so nothing is ever deleted
    fn remove(&self, _key: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn flush(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub type StateTrie<S> = EthTrie<NodeStore<S>>;

/// Open the trie rooted at `root`
pub fn open<S: NodeSource>(store: &Arc<NodeStore<S>>, root: Hash) -> StateTrie<S> {
    let trie = EthTrie::new(Arc::clone(store));
    if root == EMPTY_ROOT {
        trie
    } else {
        trie.at_root(H256(root.to_bytes()))
    }
}

/// Write the trie's new nodes into its store and return its root
pub fn commit<S: NodeSource>(trie: &mut StateTrie<S>) -> BridgeResult<Hash> {
    let root = trie.root_hash().map_err(trie_error)?;
    Ok(Hash::new(root.0))
}

pub fn trie_error(e: TrieError) -> BridgeError {
    BridgeError::Ledger(format!("state trie: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(&[u8], &[u8])]) -> (BTreeMap<Hash, Vec<u8>>, Hash) {
        let store = Arc::new(NodeStore::new(BTreeMap::new()));
        let mut trie = open(&store, EMPTY_ROOT);
        for (key, value) in entries {
            trie.insert(key, value).unwrap();
        }
        let root = commit(&mut trie).unwrap();
        (store.take_pending(), root)
    }

    #[test]
    fn test_empty_root() {
        assert_eq!(EMPTY_ROOT, keccak256(&[0x80]));

        let store = Arc::new(NodeStore::new(BTreeMap::new()));
        let mut trie = open(&store, EMPTY_ROOT);
        assert_eq!(trie.get(b"anything").unwrap(), None);
        assert_eq!(commit(&mut trie).unwrap(), EMPTY_ROOT);
    }

    #[test]
    fn test_ethereum_root() {
        let (_, root) = build(&[
            (b"doe", b"reindeer"),
            (b"dog", b"puppy"),
            (b"dogglesworth", b"cat"),
        ]);
        assert_eq!(
            root,
            Hash::from_hex("8aad789dff2f538bca5d8ea56e8abe10f4c7ba3a5dea95fea4cd6e7c3a1168d3").unwrap()
        );
    }

    #[test]
    fn test_reopen_from_persisted_nodes() {
        let (nodes, root) = build(&[(b"alpha", b"1"), (b"beta", b"2")]);

        let store = Arc::new(NodeStore::new(nodes));
        let trie = open(&store, root);
        assert_eq!(trie.get(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert_eq!(trie.get(b"beta").unwrap(), Some(b"2".to_vec()));
        assert_eq!(trie.get(b"gamma").unwrap(), None);
    }

    #[test]
    fn test_update_keeps_old_root_readable() {
        let (mut nodes, first) = build(&[(b"key", b"one")]);

        let store = Arc::new(NodeStore::new(nodes.clone()));
        let mut trie = open(&store, first);
        trie.insert(b"key", b"two").unwrap();
        let second = commit(&mut trie).unwrap();
        nodes.extend(store.take_pending());

        assert_ne!(first, second);
        let store = Arc::new(NodeStore::new(nodes));
        assert_eq!(open(&store, first).get(b"key").unwrap(), Some(b"one".to_vec()));
        assert_eq!(open(&store, second).get(b"key").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_only_new_nodes_pending() {
        let (base, root) = build(&[(b"alpha", b"1")]);
        let store = Arc::new(NodeStore::new(&base));
        let mut trie = open(&store, root);
        trie.insert(b"beta", b"2").unwrap();
        commit(&mut trie).unwrap();

        let pending = store.take_pending();
        assert!(!pending.is_empty());
        assert!(pending.keys().all(|hash| !base.contains_key(hash)));
    }

    #[test]
    fn test_tampered_value_detected() {
        let (mut nodes, root) = build(&[(b"key", b"value")]);
        nodes.insert(root, b"forged".to_vec());

        let store = NodeStore::new(nodes);
        assert!(matches!(
            store.load(&root),
            Err(BridgeError::ProofVerification(_))
        ));
    }

    #[test]
    fn test_blob_roundtrip() {
        let store = NodeStore::new(BTreeMap::new());
        let hash = store.put_blob(b"code".to_vec());
        assert_eq!(hash, keccak256(b"code"));
        assert_eq!(store.load(&hash).unwrap(), Some(b"code".to_vec()));
        assert_eq!(store.load(&keccak256(b"other")).unwrap(), None);
    }
}
