use super::chain::Block;
use crate::error::ChainError;
use crate::miner::meets_difficulty;
use crate::transaction::{OutPoint, Transaction};
use std::collections::HashMap;

/// Reject a transaction set in which two inputs spend the same output.
pub fn validate_no_double_spend(transactions: &[Transaction]) -> Result<(), ChainError> {
    let mut seen_inputs: HashMap<OutPoint, crate::crypto::Sha256Hash> = HashMap::new();
    for tx in transactions {
        for outpoint in tx.inputs().iter().filter_map(|i| i.outpoint()) {
            if let Some(conflicting_tx) = seen_inputs.insert(outpoint, tx.id()) {
                return Err(ChainError::DoubleSpend(format!(
                    "Output {}:{} is spent by both {} and {}",
                    outpoint.tx_id,
                    outpoint.index,
                    conflicting_tx,
                    tx.id()
                )));
            }
        }
    }
    Ok(())
}

/// Self-contained checks on a stored or freshly built block: its
/// transactions, summary, hash and proof of work. Linkage to other blocks is
/// checked by the chain walk in the manager.
pub fn validate_block(block: &Block) -> Result<(), ChainError> {
    if block.transactions.is_empty() {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} at height {} has no transactions",
            block.hash, block.height
        )));
    }

    for tx in &block.transactions {
        tx.validate_structure()?;
    }
    validate_no_double_spend(&block.transactions)?;

    let expected_summary = Block::calculate_summary(&block.transactions)?;
    if expected_summary != block.header.summary_hash {
        return Err(ChainError::InvalidBlock(format!(
            "Summary hash mismatch at height {}. Expected {}, but got {}.",
            block.height, expected_summary, block.header.summary_hash
        )));
    }

    let header_hash = block.header.hash();
    if header_hash != block.hash {
        return Err(ChainError::InvalidBlock(format!(
            "Block hash mismatch at height {}. Header hashes to {}, block claims {}.",
            block.height, header_hash, block.hash
        )));
    }

    if !meets_difficulty(&block.hash, block.header.difficulty) {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid Proof-of-Work: {} does not have {} leading zero bits",
            block.hash, block.header.difficulty
        )));
    }

    if block.is_genesis() != block.header.prior_hash.is_null() {
        return Err(ChainError::InvalidBlock(format!(
            "Block at height {} has prior hash {}; only genesis may use the null hash",
            block.height, block.header.prior_hash
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Address, Sha256Hash};
    use crate::miner::CancelToken;
    use crate::transaction::{TxInput, TxOutput};

    fn spend(source: Sha256Hash, to: &str) -> Transaction {
        Transaction::new(
            vec![TxInput::spending(OutPoint::new(source, 0), Address::miner())],
            vec![TxOutput::new(10, Address::from(to))],
        )
    }

    fn mined(transactions: Vec<Transaction>, prior: Sha256Hash, height: u64) -> Block {
        Block::new(transactions, prior, height, 4, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_double_spend_detected() {
        let source = Sha256Hash::from_bytes([5; 32]);
        let txs = vec![spend(source, "alice"), spend(source, "bob")];
        assert!(matches!(validate_no_double_spend(&txs), Err(ChainError::DoubleSpend(_))));

        let distinct = vec![spend(source, "alice"), spend(Sha256Hash::from_bytes([6; 32]), "bob")];
        assert!(validate_no_double_spend(&distinct).is_ok());
    }

    #[test]
    fn test_valid_genesis_passes() {
        let block = mined(vec![Transaction::coinbase(&Address::miner(), "")], Sha256Hash::null(), 0);
        assert!(validate_block(&block).is_ok());
    }

    #[test]
    fn test_tampered_transactions_fail_summary() {
        let mut block = mined(vec![Transaction::coinbase(&Address::miner(), "")], Sha256Hash::null(), 0);
        block.transactions = vec![Transaction::coinbase(&Address::from("thief"), "")];
        assert!(matches!(validate_block(&block), Err(ChainError::InvalidBlock(_))));
    }

    #[test]
    fn test_tampered_nonce_fails_hash() {
        let mut block = mined(vec![Transaction::coinbase(&Address::miner(), "")], Sha256Hash::null(), 0);
        block.header.nonce = block.header.nonce.wrapping_add(1);
        assert!(matches!(validate_block(&block), Err(ChainError::InvalidBlock(_))));
    }

    #[test]
    fn test_insufficient_work_fails() {
        let mut block = mined(vec![Transaction::coinbase(&Address::miner(), "")], Sha256Hash::null(), 0);
        // Raise the claimed difficulty and re-derive a hash that cannot meet it.
        block.header.difficulty = 255;
        block.hash = block.header.hash();
        assert!(matches!(validate_block(&block), Err(ChainError::InvalidBlock(_))));
    }

    #[test]
    fn test_non_genesis_with_null_prior_fails() {
        let block = mined(vec![Transaction::coinbase(&Address::miner(), "")], Sha256Hash::null(), 3);
        assert!(matches!(validate_block(&block), Err(ChainError::InvalidBlock(_))));
    }
}
