// ledger/src/instruction.rs

use crate::{types::Counter, Identity, InstanceId, LedgerError, LedgerResult};
use bridge_crypto::{hash::Hashable, Hash, KeyPair, Signature};
use serde::{Deserialize, Serialize};

/// A named opaque argument of an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: Vec<u8>,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered list of named arguments. The ledger never looks inside the values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments(pub Vec<Argument>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.0.push(Argument::new(name, value));
        self
    }

    /// Value of the first argument called `name`
    pub fn search(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| arg.value.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Create a new instance of `contract_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawn {
    pub contract_id: String,
    pub args: Arguments,
}

/// Run `command` on an existing instance of `contract_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoke {
    pub contract_id: String,
    pub command: String,
    pub args: Arguments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Spawn(Spawn),
    Invoke(Invoke),
}

/// One instruction, addressed at an instance and stamped with its signers
/// and their replay counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub instance_id: InstanceId,
    pub action: Action,
    pub signer_identities: Vec<Identity>,
    pub signer_counter: Vec<Counter>,
    pub signatures: Vec<Signature>,
}

impl Instruction {
    pub fn spawn(instance_id: InstanceId, contract_id: &str, args: Arguments) -> Self {
        Self::unsigned(instance_id, Action::Spawn(Spawn {
            contract_id: contract_id.to_string(),
            args,
        }))
    }

    pub fn invoke(instance_id: InstanceId, contract_id: &str, command: &str, args: Arguments) -> Self {
        Self::unsigned(instance_id, Action::Invoke(Invoke {
            contract_id: contract_id.to_string(),
            command: command.to_string(),
            args,
        }))
    }

    fn unsigned(instance_id: InstanceId, action: Action) -> Self {
        Self {
            instance_id,
            action,
            signer_identities: Vec::new(),
            signer_counter: Vec::new(),
            signatures: Vec::new(),
        }
    }

    pub fn contract_id(&self) -> &str {
        match &self.action {
            Action::Spawn(spawn) => &spawn.contract_id,
            Action::Invoke(invoke) => &invoke.contract_id,
        }
    }

    /// Hash of everything but the signatures
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.instance_id.as_bytes());
        match &self.action {
            Action::Spawn(spawn) => {
                buf.push(0);
                write_field(&mut buf, spawn.contract_id.as_bytes());
                write_args(&mut buf, &spawn.args);
            }
            Action::Invoke(invoke) => {
                buf.push(1);
                write_field(&mut buf, invoke.contract_id.as_bytes());
                write_field(&mut buf, invoke.command.as_bytes());
                write_args(&mut buf, &invoke.args);
            }
        }
        buf.extend_from_slice(&(self.signer_identities.len() as u64).to_le_bytes());
        for identity in &self.signer_identities {
            write_field(&mut buf, identity.to_string().as_bytes());
        }
        for counter in &self.signer_counter {
            buf.extend_from_slice(&counter.to_le_bytes());
        }
        buf.hash()
    }

    /// Deterministic id of an instance created by this instruction
    pub fn derive_id(&self, what: &str) -> InstanceId {
        InstanceId::derive(&[self.hash().as_bytes(), what.as_bytes()])
    }
}

fn write_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn write_args(buf: &mut Vec<u8>, args: &Arguments) {
    buf.extend_from_slice(&(args.0.len() as u64).to_le_bytes());
    for arg in &args.0 {
        write_field(buf, arg.name.as_bytes());
        write_field(buf, &arg.value);
    }
}

/// The unit of submission: one or more instructions committed atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTransaction {
    pub instructions: Vec<Instruction>,
}

impl ClientTransaction {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// The digest every signer signs
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(32 * self.instructions.len());
        for instruction in &self.instructions {
            buf.extend_from_slice(instruction.hash().as_bytes());
        }
        buf.hash()
    }

    /// Stamp every instruction with the signers' identities and sign the
    /// transaction with each of them. Counters must already be set.
    pub fn fill_signers_and_sign_with(&mut self, signers: &[&KeyPair]) -> LedgerResult<()> {
        if signers.is_empty() {
            return Err(LedgerError::Rejected("no signers given".into()));
        }

        let identities: Vec<Identity> = signers.iter().map(|kp| Identity::of(kp)).collect();
        for instruction in &mut self.instructions {
            if instruction.signer_counter.len() != signers.len() {
                return Err(LedgerError::Rejected(format!(
                    "instruction has {} counters for {} signers",
                    instruction.signer_counter.len(),
                    signers.len()
                )));
            }
            instruction.signer_identities = identities.clone();
        }

        let digest = self.hash();
        for instruction in &mut self.instructions {
            instruction.signatures = signers
                .iter()
                .map(|kp| kp.sign(digest.as_bytes()))
                .collect::<Result<_, _>>()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::SignatureScheme;

    fn signed_invoke(keypair: &KeyPair, counter: u64) -> ClientTransaction {
        let mut instruction = Instruction::invoke(
            InstanceId::new([1u8; 32]),
            "value",
            "update",
            Arguments::new().with("value", b"hello".to_vec()),
        );
        instruction.signer_counter = vec![counter];
        let mut tx = ClientTransaction::new(vec![instruction]);
        tx.fill_signers_and_sign_with(&[keypair]).unwrap();
        tx
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let tx = signed_invoke(&keypair, 1);

        let digest = tx.hash();
        let instruction = &tx.instructions[0];
        assert_eq!(instruction.signer_identities, vec![Identity::of(&keypair)]);
        assert!(keypair
            .public_key()
            .verify(digest.as_bytes(), &instruction.signatures[0])
            .unwrap());
    }

    #[test]
    fn test_counter_changes_hash_and_derived_id() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let a = signed_invoke(&keypair, 1);
        let b = signed_invoke(&keypair, 2);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(
            a.instructions[0].derive_id(""),
            b.instructions[0].derive_id("")
        );
    }

    #[test]
    fn test_signatures_not_part_of_hash() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let mut tx = signed_invoke(&keypair, 1);
        let before = tx.instructions[0].hash();
        tx.instructions[0].signatures.clear();
        assert_eq!(before, tx.instructions[0].hash());
    }

    #[test]
    fn test_missing_counter_is_refused() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let mut tx = ClientTransaction::new(vec![Instruction::spawn(
            InstanceId::new([0u8; 32]),
            "value",
            Arguments::new(),
        )]);
        assert!(tx.fill_signers_and_sign_with(&[&keypair]).is_err());
    }

    #[test]
    fn test_argument_search() {
        let args = Arguments::new()
            .with("address", vec![1, 2])
            .with("amount", vec![3]);
        assert_eq!(args.search("amount"), Some(&[3u8][..]));
        assert_eq!(args.search("missing"), None);
    }
}
