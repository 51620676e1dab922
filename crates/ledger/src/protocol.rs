// ledger/src/protocol.rs

use crate::{
    Action, Arguments, ClientTransaction, Identity, InstanceId, Instruction, LedgerClient,
    LedgerError, LedgerResult, Receipt,
};
use bridge_crypto::KeyPair;
use std::sync::Arc;

/// Builds, signs, submits and awaits single-instruction transactions on
/// behalf of one signer.
///
/// The signer's replay counter is read from the ledger before every
/// submission. Two `InstructionClient`s sharing a signer can still race
/// between that read and inclusion; the loser is rejected, never replayed.
pub struct InstructionClient<C> {
    client: Arc<C>,
    signer: KeyPair,
    identity: Identity,
    max_block_intervals: u32,
}

impl<C: LedgerClient> InstructionClient<C> {
    pub fn new(client: Arc<C>, signer: KeyPair, max_block_intervals: u32) -> Self {
        let identity = Identity::of(&signer);
        Self {
            client,
            signer,
            identity,
            max_block_intervals,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Spawn a new instance of `contract_id` through the instance `base_id`
    /// and return the id of the created instance
    pub async fn spawn_instance(
        &self,
        base_id: InstanceId,
        contract_id: &str,
        args: Arguments,
    ) -> LedgerResult<InstanceId> {
        let instruction = Instruction::spawn(base_id, contract_id, args);
        let (tx, receipt) = self.submit(instruction).await?;
        let instance_id = tx.instructions[0].derive_id("");

        tracing::info!(
            "Spawned {} instance {} in block {}",
            contract_id, instance_id, receipt.block_index
        );
        Ok(instance_id)
    }

    /// Run `command` on the existing instance `instance_id`
    pub async fn invoke(
        &self,
        instance_id: InstanceId,
        contract_id: &str,
        command: &str,
        args: Arguments,
    ) -> LedgerResult<Receipt> {
        let instruction = Instruction::invoke(instance_id, contract_id, command, args);
        let (_, receipt) = self.submit(instruction).await?;

        tracing::debug!(
            "Invoked {}:{} on {} in block {}",
            contract_id, command, instance_id, receipt.block_index
        );
        Ok(receipt)
    }

    async fn submit(&self, mut instruction: Instruction) -> LedgerResult<(ClientTransaction, Receipt)> {
        let counters = self
            .client
            .get_signer_counters(std::slice::from_ref(&self.identity))
            .await?;
        let current = counters.first().copied().ok_or_else(|| {
            LedgerError::Serialization("ledger returned no signer counter".into())
        })?;

        instruction.signer_counter = vec![current + 1];
        let mut tx = ClientTransaction::new(vec![instruction]);
        tx.fill_signers_and_sign_with(&[&self.signer])?;

        if let Action::Invoke(invoke) = &tx.instructions[0].action {
            tracing::debug!(
                "Submitting {} with counter {} ({} argument(s))",
                invoke.command, current + 1, invoke.args.0.len()
            );
        }

        // Sending the transaction does not put it in the global state; the
        // ledger answers once a block containing it is created.
        let receipt = self
            .client
            .submit_transaction_and_wait(tx.clone(), self.max_block_intervals)
            .await?;

        Ok((tx, receipt))
    }
}
