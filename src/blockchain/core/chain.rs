use crate::crypto::{hash256, Sha256Hash};
use crate::error::ChainError;
use crate::miner::{mint, CancelToken};
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub prior_hash: Sha256Hash,
    pub summary_hash: Sha256Hash,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Leading zero bits required of the block hash.
    pub difficulty: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn new(prior_hash: Sha256Hash, summary_hash: Sha256Hash, difficulty: u32) -> Self {
        BlockHeader {
            prior_hash,
            summary_hash,
            timestamp: chrono::Utc::now().timestamp(),
            difficulty,
            nonce: 0,
        }
    }

    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.prior_hash);
        hasher.update(self.summary_hash);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.difficulty.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        Sha256Hash::from_bytes(hasher.finalize().into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Distance from genesis; genesis is 0.
    pub height: u64,
    pub transactions: Vec<Transaction>,
    pub hash: Sha256Hash,
}

impl Block {
    /// Assemble and mine a block on top of `prior_hash`.
    ///
    /// Fails without producing a block if a transaction cannot be hashed or
    /// mining is cancelled.
    pub fn new(
        transactions: Vec<Transaction>,
        prior_hash: Sha256Hash,
        height: u64,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<Self, ChainError> {
        let summary_hash = Block::calculate_summary(&transactions)?;
        let mut header = BlockHeader::new(prior_hash, summary_hash, difficulty);
        let hash = mint(&mut header, cancel)?;

        Ok(Block {
            header,
            height,
            transactions,
            hash,
        })
    }

    /// Digest of the concatenated transaction digests.
    pub fn calculate_summary(transactions: &[Transaction]) -> Result<Sha256Hash, ChainError> {
        let mut buffer = Vec::with_capacity(transactions.len() * Sha256Hash::LEN);
        for tx in transactions {
            buffer.extend_from_slice(tx.hash()?.as_bytes());
        }
        Ok(hash256(&buffer))
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    pub fn txn_count(&self) -> usize {
        self.transactions.len()
    }

    /// Block timestamp rendered as RFC 3339, or the raw seconds if out of range.
    pub fn timestamp_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp(self.header.timestamp, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.header.timestamp.to_string())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "=======[{}][{}]", self.height, self.timestamp_rfc3339())?;
        writeln!(f, "Block Hash: 0x{}", self.hash)?;
        writeln!(f, "Prior Hash: 0x{}", self.header.prior_hash)?;
        writeln!(f, "Transactions: {}", self.txn_count())?;
        writeln!(f, "Nonce: {}", self.header.nonce)?;
        write!(f, "=========================================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Address;
    use crate::miner::meets_difficulty;

    fn genesis(difficulty: u32) -> Block {
        let coinbase = Transaction::coinbase(&Address::miner(), "test genesis");
        Block::new(vec![coinbase], Sha256Hash::null(), 0, difficulty, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_new_block_is_mined() {
        let block = genesis(6);
        assert!(block.is_genesis());
        assert!(block.header.prior_hash.is_null());
        assert_eq!(block.hash, block.header.hash());
        assert!(meets_difficulty(&block.hash, 6));
        assert_eq!(block.txn_count(), 1);
    }

    #[test]
    fn test_summary_depends_on_order_and_content() {
        let a = Transaction::coinbase(&Address::from("a"), "");
        let b = Transaction::coinbase(&Address::from("b"), "");
        let ab = Block::calculate_summary(&[a.clone(), b.clone()]).unwrap();
        let ba = Block::calculate_summary(&[b.clone(), a.clone()]).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab, Block::calculate_summary(&[a, b]).unwrap());
    }

    #[test]
    fn test_block_links_to_prior() {
        let first = genesis(4);
        let tx = Transaction::coinbase(&Address::from("alice"), "second");
        let second = Block::new(vec![tx], first.hash, 1, 4, &CancelToken::new()).unwrap();
        assert_eq!(second.header.prior_hash, first.hash);
        assert_eq!(second.height, 1);
        assert!(!second.is_genesis());
    }

    #[test]
    fn test_cancelled_assembly_produces_no_block() {
        let token = CancelToken::new();
        token.cancel();
        let tx = Transaction::coinbase(&Address::miner(), "");
        let result = Block::new(vec![tx], Sha256Hash::null(), 0, 8, &token);
        assert_eq!(result, Err(ChainError::MiningCancelled));
    }

    #[test]
    fn test_block_roundtrip_through_codec() {
        let block = genesis(4);
        let bytes = crate::codec::encode(&block).unwrap();
        let back: Block = crate::codec::decode(&bytes).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.header.hash(), block.hash);
    }

    #[test]
    fn test_display_and_timestamp() {
        let block = genesis(0);
        let rendered = block.to_string();
        assert!(rendered.contains(&block.hash.to_hex()));
        assert!(block.timestamp_rfc3339().contains('T'));
    }
}
