// ledger/src/client.rs

use crate::{ClientTransaction, Identity, InstanceId, LedgerIdentity, LedgerResult, Proof, Receipt};
use async_trait::async_trait;

/// Narrow client API of a replicated ledger.
///
/// Implementations are shared read-only across concurrent callers.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Identity that proofs from this ledger must verify against
    fn ledger_identity(&self) -> &LedgerIdentity;

    /// Proof of the current value of `key` (or of its absence)
    async fn get_proof(&self, key: &InstanceId) -> LedgerResult<Proof>;

    /// Latest committed replay counter of each identity (0 if never used)
    async fn get_signer_counters(&self, identities: &[Identity]) -> LedgerResult<Vec<u64>>;

    /// Submit `tx` and wait until it is included in a block, for at most
    /// `max_block_intervals` block intervals
    async fn submit_transaction_and_wait(
        &self,
        tx: ClientTransaction,
        max_block_intervals: u32,
    ) -> LedgerResult<Receipt>;
}
