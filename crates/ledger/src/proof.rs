// ledger/src/proof.rs

use crate::{types::BlockIndex, InstanceId, LedgerError, LedgerIdentity, LedgerResult};
use bridge_crypto::{hash::Hashable, Hash, MerkleProof, Signature};
use serde::{Deserialize, Serialize};

/// Value stored for an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub value: Vec<u8>,
    pub contract_id: String,
    pub version: u64,
}

impl StateEntry {
    /// Bytes committed into the ledger's Merkle tree for this entry
    pub fn leaf_bytes(&self, id: &InstanceId) -> LedgerResult<Vec<u8>> {
        Ok(bincode::serialize(&(id, self))?)
    }
}

/// Header of a committed block, signed by the ledger's collective key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub ledger_id: Hash,
    pub index: BlockIndex,
    /// Merkle root over all entries, in instance id order
    pub entries_root: Hash,
}

impl BlockHeader {
    pub fn hash(&self) -> LedgerResult<Hash> {
        Ok(bincode::serialize(self)?.hash())
    }
}

/// Authenticated answer to "what is the current value of this instance".
/// `entry` is `None` when the instance does not exist at that block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub header: BlockHeader,
    pub signature: Signature,
    pub key: InstanceId,
    pub entry: Option<(StateEntry, MerkleProof)>,
}

impl Proof {
    /// Check the proof against the ledger's identity: right ledger, block
    /// signed by the collective key, and entry included under the signed root.
    pub fn verify(&self, ledger: &LedgerIdentity) -> LedgerResult<()> {
        if self.header.ledger_id != ledger.id {
            return Err(LedgerError::ProofVerification(format!(
                "proof is for ledger {}, expected {}",
                self.header.ledger_id, ledger.id
            )));
        }

        let header_hash = self.header.hash()?;
        let signed = ledger
            .collective_key
            .verify(header_hash.as_bytes(), &self.signature)
            .unwrap_or(false);
        if !signed {
            return Err(LedgerError::ProofVerification(
                "block header signature does not match the collective key".into(),
            ));
        }

        if let Some((entry, inclusion)) = &self.entry {
            let leaf = entry.leaf_bytes(&self.key)?;
            if !inclusion.verify(self.header.entries_root, &leaf) {
                return Err(LedgerError::ProofVerification(format!(
                    "entry for {} is not included under block {}",
                    self.key, self.header.index
                )));
            }
        }

        Ok(())
    }

    /// Whether the proof shows the key as present
    pub fn matches(&self) -> bool {
        self.entry.is_some()
    }

    /// Key, value, contract id and version of the proven entry
    pub fn key_value(&self) -> LedgerResult<(InstanceId, &[u8], &str, u64)> {
        match &self.entry {
            Some((entry, _)) => Ok((
                self.key,
                entry.value.as_slice(),
                entry.contract_id.as_str(),
                entry.version,
            )),
            None => Err(LedgerError::MissingInstance(self.key)),
        }
    }

    /// The committed value of the instance
    pub fn extract_value(&self) -> LedgerResult<Vec<u8>> {
        self.key_value().map(|(_, value, _, _)| value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::{KeyPair, MerkleTree, SignatureScheme};

    fn signed_proof(collective: &KeyPair, ledger_id: Hash) -> Proof {
        let key = InstanceId::new([9u8; 32]);
        let entry = StateEntry {
            value: b"payload".to_vec(),
            contract_id: "value".into(),
            version: 0,
        };
        let other = StateEntry {
            value: b"other".to_vec(),
            contract_id: "value".into(),
            version: 3,
        };
        let leaves = vec![
            other.leaf_bytes(&InstanceId::new([1u8; 32])).unwrap(),
            entry.leaf_bytes(&key).unwrap(),
        ];
        let tree = MerkleTree::new(&leaves).unwrap();
        let header = BlockHeader {
            ledger_id,
            index: 4,
            entries_root: tree.root(),
        };
        let signature = collective.sign(header.hash().unwrap().as_bytes()).unwrap();
        Proof {
            header,
            signature,
            key,
            entry: Some((entry, tree.proof(1).unwrap())),
        }
    }

    fn identity(collective: &KeyPair, id: Hash) -> LedgerIdentity {
        LedgerIdentity {
            id,
            collective_key: collective.public_key().clone(),
        }
    }

    #[test]
    fn test_valid_proof() {
        let collective = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let id = b"ledger".hash();
        let proof = signed_proof(&collective, id);

        proof.verify(&identity(&collective, id)).unwrap();
        assert_eq!(proof.extract_value().unwrap(), b"payload".to_vec());
    }

    #[test]
    fn test_tampered_value_fails() {
        let collective = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let id = b"ledger".hash();
        let mut proof = signed_proof(&collective, id);
        if let Some((entry, _)) = proof.entry.as_mut() {
            entry.value[0] ^= 0xff;
        }

        assert!(matches!(
            proof.verify(&identity(&collective, id)),
            Err(LedgerError::ProofVerification(_))
        ));
    }

    #[test]
    fn test_wrong_collective_key_fails() {
        let collective = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let impostor = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let id = b"ledger".hash();
        let proof = signed_proof(&impostor, id);

        assert!(proof.verify(&identity(&collective, id)).is_err());
    }

    #[test]
    fn test_wrong_ledger_fails() {
        let collective = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let proof = signed_proof(&collective, b"ledger".hash());

        assert!(proof.verify(&identity(&collective, b"elsewhere".hash())).is_err());
    }

    #[test]
    fn test_absent_entry() {
        let collective = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let id = b"ledger".hash();
        let mut proof = signed_proof(&collective, id);
        proof.entry = None;

        proof.verify(&identity(&collective, id)).unwrap();
        assert!(!proof.matches());
        assert!(matches!(
            proof.extract_value(),
            Err(LedgerError::MissingInstance(_))
        ));
    }
}
