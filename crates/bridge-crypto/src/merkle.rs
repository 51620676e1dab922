// bridge-crypto/src/merkle.rs

use crate::{hash::Hashable, CryptoError, CryptoResult, Hash};
use serde::{Deserialize, Serialize};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Binary Merkle tree over the ledger's committed entries.
///
/// Leaves and inner nodes are hashed with distinct prefixes so an inner node
/// can never be presented as a leaf. The leaf level is padded with zero hashes
/// up to the next power of two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    /// All nodes in the tree, stored as a flat heap (root at index 0)
    nodes: Vec<Hash>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf data
    pub fn new<T: AsRef<[u8]>>(leaves: &[T]) -> CryptoResult<Self> {
        if leaves.is_empty() {
            return Err(CryptoError::MerkleError("Cannot create empty tree".into()));
        }

        let leaf_count = leaves.len();
        let padded = leaf_count.next_power_of_two();
        let mut nodes = vec![Hash::zero(); 2 * padded - 1];

        let leaf_start = padded - 1;
        for (i, leaf) in leaves.iter().enumerate() {
            nodes[leaf_start + i] = Self::hash_leaf(leaf.as_ref());
        }

        for index in (0..leaf_start).rev() {
            let left = nodes[2 * index + 1];
            let right = nodes[2 * index + 2];
            nodes[index] = Self::combine_hashes(left, right);
        }

        Ok(Self { nodes, leaf_count })
    }

    /// Get the root hash of the tree
    pub fn root(&self) -> Hash {
        self.nodes[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Generate an inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> CryptoResult<MerkleProof> {
        if index >= self.leaf_count {
            return Err(CryptoError::MerkleError("Index out of bounds".into()));
        }

        let mut proof_hashes = Vec::new();
        let mut current = self.leaf_start() + index;

        while current > 0 {
            let sibling = if current % 2 == 0 { current - 1 } else { current + 1 };
            proof_hashes.push(self.nodes[sibling]);
            current = (current - 1) / 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            proof_hashes,
        })
    }

    /// Verify that `leaf_data` sits at the proof's index under `root`
    pub fn verify_proof(root: Hash, proof: &MerkleProof, leaf_data: &[u8]) -> bool {
        let mut current_hash = Self::hash_leaf(leaf_data);
        let mut index = proof.leaf_index;

        for sibling in &proof.proof_hashes {
            current_hash = if index % 2 == 0 {
                Self::combine_hashes(current_hash, *sibling)
            } else {
                Self::combine_hashes(*sibling, current_hash)
            };
            index /= 2;
        }

        index == 0 && current_hash == root
    }

    fn leaf_start(&self) -> usize {
        self.nodes.len() - self.leaf_count.next_power_of_two()
    }

    fn hash_leaf(data: &[u8]) -> Hash {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(LEAF_PREFIX);
        buf.extend_from_slice(data);
        buf.hash()
    }

    fn combine_hashes(left: Hash, right: Hash) -> Hash {
        let mut combined = Vec::with_capacity(65);
        combined.push(NODE_PREFIX);
        combined.extend_from_slice(left.as_bytes());
        combined.extend_from_slice(right.as_bytes());
        combined.hash()
    }
}

/// Merkle proof for verifying a leaf is in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    leaf_index: usize,
    proof_hashes: Vec<Hash>,
}

impl MerkleProof {
    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }

    pub fn proof_hashes(&self) -> &[Hash] {
        &self.proof_hashes
    }

    pub fn verify(&self, root: Hash, leaf_data: &[u8]) -> bool {
        MerkleTree::verify_proof(root, self, leaf_data)
    }
}
