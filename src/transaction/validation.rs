/// Structural validation of transactions, independent of chain state
use crate::error::ChainError;
use crate::transaction::types::{Transaction, COINBASE_OUTPUT_INDEX};

impl Transaction {
    /// Checks that need nothing but the transaction itself: a consistent
    /// id, at least one output, no zero-value outputs, an output total that
    /// fits in a `u64`, and inputs that are either the coinbase marker or a
    /// real reference.
    pub fn validate_structure(&self) -> Result<(), ChainError> {
        if !self.has_valid_id() {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction id {} does not match its contents",
                self.id()
            )));
        }

        if self.outputs().is_empty() {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} has no outputs",
                self.id()
            )));
        }

        if let Some(index) = self.outputs().iter().position(|o| o.value == 0) {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} output {} carries no value",
                self.id(),
                index
            )));
        }

        if self.total_output_value().is_none() {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} output values overflow",
                self.id()
            )));
        }

        if self.is_coinbase() {
            return Ok(());
        }

        if self.inputs().is_empty() {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} has no inputs",
                self.id()
            )));
        }

        for (position, input) in self.inputs().iter().enumerate() {
            if input.outpoint().is_none() {
                return Err(ChainError::InvalidTransaction(format!(
                    "Transaction {} input {} has no valid source (index {}, coinbase marker is {})",
                    self.id(),
                    position,
                    input.output_index,
                    COINBASE_OUTPUT_INDEX
                )));
            }
        }

        Ok(())
    }
}
