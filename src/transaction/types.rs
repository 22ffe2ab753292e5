/// Transaction types for LedgerChain
use crate::codec;
use crate::crypto::{hash256, Address, Sha256Hash};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Value minted by every coinbase transaction.
pub const COINBASE_REWARD: u64 = 100;

/// Output index carried by the single input of a coinbase transaction.
pub const COINBASE_OUTPUT_INDEX: i64 = -1;

/// A reference to one output of a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_id: Sha256Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_id: Sha256Hash, index: u32) -> Self {
        OutPoint { tx_id, index }
    }
}

/// A spendable unit of value owned by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub owner: Address,
}

impl TxOutput {
    pub fn new(value: u64, owner: Address) -> Self {
        TxOutput { value, owner }
    }

    pub fn can_be_unlocked(&self, address: &Address) -> bool {
        self.owner == *address
    }
}

/// Spends exactly one prior output, identified by transaction id and index.
///
/// A coinbase input references nothing: its source id is the null hash and
/// its index is [`COINBASE_OUTPUT_INDEX`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub source_tx_id: Sha256Hash,
    pub output_index: i64,
    pub unlock_address: Address,
}

impl TxInput {
    pub fn spending(outpoint: OutPoint, unlock_address: Address) -> Self {
        TxInput {
            source_tx_id: outpoint.tx_id,
            output_index: outpoint.index as i64,
            unlock_address,
        }
    }

    pub fn can_unlock(&self, address: &Address) -> bool {
        self.unlock_address == *address
    }

    /// The output this input spends, or `None` for a non-referencing input.
    pub fn outpoint(&self) -> Option<OutPoint> {
        if self.source_tx_id.is_null() {
            return None;
        }
        u32::try_from(self.output_index)
            .ok()
            .map(|index| OutPoint::new(self.source_tx_id, index))
    }
}

/// A transaction moving value between addresses.
///
/// The id is derived from the inputs and outputs when the transaction is
/// built and the fields are not mutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: Sha256Hash,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let id = Self::compute_id(&inputs, &outputs);
        Transaction { id, inputs, outputs }
    }

    /// Block reward paying [`COINBASE_REWARD`] to `to`.
    ///
    /// The memo travels in the unlock field of the non-referencing input; an
    /// empty memo is replaced by a default naming the recipient.
    pub fn coinbase(to: &Address, memo: &str) -> Self {
        let memo = if memo.is_empty() {
            format!("Coins to {}", to)
        } else {
            memo.to_string()
        };

        let input = TxInput {
            source_tx_id: Sha256Hash::null(),
            output_index: COINBASE_OUTPUT_INDEX,
            unlock_address: Address::new(memo),
        };
        let output = TxOutput::new(COINBASE_REWARD, to.clone());

        Transaction::new(vec![input], vec![output])
    }

    pub fn id(&self) -> Sha256Hash {
        self.id
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].source_tx_id.is_null()
            && self.inputs[0].output_index == COINBASE_OUTPUT_INDEX
    }

    /// Sum of all output values, or `None` if it does not fit in a `u64`.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, o| total.checked_add(o.value))
    }

    /// Whether the stored id still matches the inputs and outputs.
    pub fn has_valid_id(&self) -> bool {
        self.id == Self::compute_id(&self.inputs, &self.outputs)
    }

    /// Digest of the full encoded transaction, used for the block summary.
    pub fn hash(&self) -> Result<Sha256Hash> {
        let bytes = codec::encode(self)?;
        Ok(hash256(&bytes))
    }

    pub fn hash_str(&self) -> Result<String> {
        Ok(self.hash()?.to_hex())
    }

    fn compute_id(inputs: &[TxInput], outputs: &[TxOutput]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update((inputs.len() as u64).to_le_bytes());
        for input in inputs {
            hasher.update(input.source_tx_id);
            hasher.update(input.output_index.to_le_bytes());
            hasher.update((input.unlock_address.as_str().len() as u64).to_le_bytes());
            hasher.update(input.unlock_address.as_str().as_bytes());
        }
        hasher.update((outputs.len() as u64).to_le_bytes());
        for output in outputs {
            hasher.update(output.value.to_le_bytes());
            hasher.update((output.owner.as_str().len() as u64).to_le_bytes());
            hasher.update(output.owner.as_str().as_bytes());
        }
        Sha256Hash::from_bytes(hasher.finalize().into())
    }
}
