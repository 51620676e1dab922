// ledger/src/contract.rs

use crate::{InstanceId, Instruction, Invoke, LedgerResult, Spawn, StateEntry};
use std::collections::BTreeMap;

/// Read access to the ledger state an instruction executes against
pub trait ReadOnlyState: Sync {
    fn get(&self, id: &InstanceId) -> Option<&StateEntry>;
}

impl ReadOnlyState for BTreeMap<InstanceId, StateEntry> {
    fn get(&self, id: &InstanceId) -> Option<&StateEntry> {
        BTreeMap::get(self, id)
    }
}

/// Change requested by a contract; applied atomically with the rest of the
/// transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Create {
        id: InstanceId,
        contract_id: String,
        value: Vec<u8>,
    },
    Update {
        id: InstanceId,
        value: Vec<u8>,
    },
    Remove {
        id: InstanceId,
    },
}

/// Contract logic hosted by the ledger. Argument values are opaque to the
/// ledger; only the contract interprets them.
pub trait Contract: Send + Sync {
    fn spawn(
        &self,
        state: &dyn ReadOnlyState,
        instruction: &Instruction,
        spawn: &Spawn,
    ) -> LedgerResult<Vec<StateChange>>;

    fn invoke(
        &self,
        state: &dyn ReadOnlyState,
        instruction: &Instruction,
        invoke: &Invoke,
    ) -> LedgerResult<Vec<StateChange>>;
}
