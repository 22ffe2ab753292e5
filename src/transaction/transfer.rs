//! Transfer construction against a read-only view of unspent outputs.

use super::types::{OutPoint, Transaction, TxInput, TxOutput};
use crate::crypto::Address;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

/// A request to move `amount` from one address to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

impl TransferSpec {
    pub fn new(from: impl Into<Address>, to: impl Into<Address>, amount: u64) -> Self {
        TransferSpec { from: from.into(), to: to.into(), amount }
    }
}

/// An unspent output together with where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub output: TxOutput,
}

/// Result of greedy output selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendableOutputs {
    /// Sum of the selected outputs. Below the requested amount only when the
    /// address does not own enough.
    pub accumulated: u64,
    pub outpoints: Vec<OutPoint>,
}

/// Read-only queries over the unspent outputs of the chain.
///
/// Transaction construction only needs this capability, never the chain
/// manager itself.
pub trait UtxoResolver {
    /// Transactions holding at least one output unspent by `address`.
    fn find_unspent_transactions(&self, address: &Address) -> Result<Vec<Transaction>>;

    /// Every unspent output owned by `address`, newest first.
    fn find_unspent_outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>>;

    fn find_utxo(&self, address: &Address) -> Result<Vec<TxOutput>> {
        Ok(self
            .find_unspent_outputs(address)?
            .into_iter()
            .map(|u| u.output)
            .collect())
    }

    /// First-fit selection: take outputs in discovery order until the
    /// running total reaches `amount`.
    fn find_spendable_outputs(&self, address: &Address, amount: u64) -> Result<SpendableOutputs> {
        let mut selected = SpendableOutputs::default();
        for unspent in self.find_unspent_outputs(address)? {
            if selected.accumulated >= amount {
                break;
            }
            selected.accumulated = add_value(address, selected.accumulated, unspent.output.value)?;
            selected.outpoints.push(unspent.outpoint);
        }
        Ok(selected)
    }

    fn balance(&self, address: &Address) -> Result<u64> {
        total_value(address, self.find_utxo(address)?.iter().map(|o| o.value))
    }
}

/// `running + value` for outputs owned by `address`, failing instead of
/// wrapping when the chain holds more than a `u64` for one owner.
pub fn add_value(address: &Address, running: u64, value: u64) -> Result<u64> {
    running.checked_add(value).ok_or_else(|| {
        ChainError::StateCorruption(format!("unspent value owned by {} overflows u64", address))
    })
}

pub fn total_value(address: &Address, values: impl IntoIterator<Item = u64>) -> Result<u64> {
    values
        .into_iter()
        .try_fold(0u64, |total, value| add_value(address, total, value))
}

/// Build a transaction paying `amount` from `from` to `to`.
///
/// One input is created per selected output. Any surplus over `amount` is
/// returned to `from` as a second output.
pub fn new_transfer(
    from: &Address,
    to: &Address,
    amount: u64,
    resolver: &dyn UtxoResolver,
) -> Result<Transaction> {
    if amount == 0 {
        return Err(ChainError::InvalidTransaction(
            "Transfer amount must be greater than zero".to_string(),
        ));
    }

    let spendable = resolver.find_spendable_outputs(from, amount)?;
    if spendable.accumulated < amount {
        return Err(ChainError::InsufficientFunds {
            address: from.to_string(),
            requested: amount,
            available: spendable.accumulated,
        });
    }

    let inputs = spendable
        .outpoints
        .iter()
        .map(|outpoint| TxInput::spending(*outpoint, from.clone()))
        .collect();

    let mut outputs = vec![TxOutput::new(amount, to.clone())];
    if spendable.accumulated > amount {
        outputs.push(TxOutput::new(spendable.accumulated - amount, from.clone()));
    }

    Ok(Transaction::new(inputs, outputs))
}

impl TransferSpec {
    pub fn build(&self, resolver: &dyn UtxoResolver) -> Result<Transaction> {
        new_transfer(&self.from, &self.to, self.amount, resolver)
    }
}
