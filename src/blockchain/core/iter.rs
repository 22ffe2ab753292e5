use super::chain::Block;
use crate::cache::BlockCache;
use crate::codec;
use crate::crypto::Sha256Hash;
use crate::error::ChainError;
use crate::persistence::Store;
use std::sync::Arc;

/// Walks the chain backwards, newest block first, ending after genesis.
///
/// The cursor is fixed to the head at creation time, so blocks appended
/// afterwards are not visited. The walk cannot be restarted; create a new
/// iterator instead.
pub struct ChainIterator {
    store: Arc<dyn Store>,
    cache: Arc<BlockCache>,
    cursor: Sha256Hash,
    failed: bool,
}

impl ChainIterator {
    pub fn new(store: Arc<dyn Store>, cache: Arc<BlockCache>, head: Sha256Hash) -> Self {
        ChainIterator { store, cache, cursor: head, failed: false }
    }

    /// True once genesis has been yielded. Stays false after a load error;
    /// the cursor then still points at the block that failed.
    pub fn done(&self) -> bool {
        self.cursor.is_null()
    }

    pub fn cursor(&self) -> Sha256Hash {
        self.cursor
    }

    /// Load the block at the cursor and step to its prior block.
    ///
    /// A hash that the chain references but the store does not hold is a
    /// broken chain and is reported as [`ChainError::StateCorruption`].
    pub fn next_block(&mut self) -> Result<Block, ChainError> {
        if self.done() {
            return Err(ChainError::StateCorruption(
                "iterator advanced past the genesis block".to_string(),
            ));
        }

        let block = load_block(self.store.as_ref(), &self.cache, &self.cursor)?;
        self.cursor = block.header.prior_hash;
        Ok(block)
    }
}

impl Iterator for ChainIterator {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done() || self.failed {
            return None;
        }
        let result = self.next_block();
        // Nothing sensible lies behind a broken link; yield the error once.
        self.failed = result.is_err();
        Some(result)
    }
}

/// Fetch and decode the block stored under `hash`, consulting the cache first.
pub(crate) fn load_block(
    store: &dyn Store,
    cache: &BlockCache,
    hash: &Sha256Hash,
) -> Result<Block, ChainError> {
    if let Some(block) = cache.get(hash) {
        return Ok(block);
    }

    let bytes = store.get(hash.as_bytes()).map_err(|e| {
        if e.is_not_found() {
            ChainError::StateCorruption(format!("block {} referenced by the chain is missing", hash))
        } else {
            e
        }
    })?;

    let block: Block = codec::decode(&bytes)?;
    if block.hash != *hash {
        return Err(ChainError::StateCorruption(format!(
            "block stored under {} carries hash {}",
            hash, block.hash
        )));
    }

    cache.insert(block.clone());
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Address;
    use crate::miner::CancelToken;
    use crate::persistence::MemoryStore;
    use crate::transaction::Transaction;

    fn build_chain(store: &dyn Store, length: u64) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        for height in 0..length {
            let prior = blocks.last().map(|b| b.hash).unwrap_or_default();
            let tx = Transaction::coinbase(&Address::miner(), &format!("block {}", height));
            let block = Block::new(vec![tx], prior, height, 2, &CancelToken::new()).unwrap();
            store
                .put(block.hash.as_bytes(), &codec::encode(&block).unwrap())
                .unwrap();
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn test_iterates_newest_to_oldest() {
        let store = Arc::new(MemoryStore::new());
        let blocks = build_chain(store.as_ref(), 4);
        let head = blocks.last().unwrap().hash;

        let iter = ChainIterator::new(store, Arc::new(BlockCache::new(8)), head);
        let heights: Vec<u64> = iter.map(|b| b.unwrap().height).collect();
        assert_eq!(heights, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_done_after_genesis() {
        let store = Arc::new(MemoryStore::new());
        let blocks = build_chain(store.as_ref(), 2);

        let mut iter = ChainIterator::new(store, Arc::new(BlockCache::new(8)), blocks[1].hash);
        assert!(!iter.done());
        assert_eq!(iter.next_block().unwrap().height, 1);
        assert!(!iter.done());
        assert!(iter.next_block().unwrap().is_genesis());
        assert!(iter.done());
        assert!(iter.next().is_none());
        assert!(matches!(iter.next_block(), Err(ChainError::StateCorruption(_))));
    }

    #[test]
    fn test_missing_block_is_corruption() {
        let store = Arc::new(MemoryStore::new());
        let blocks = build_chain(store.as_ref(), 3);
        store.delete(blocks[1].hash.as_bytes()).unwrap();

        let mut iter = ChainIterator::new(store, Arc::new(BlockCache::new(8)), blocks[2].hash);
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(ChainError::StateCorruption(_)))));
        assert!(iter.next().is_none());

        assert!(!iter.done());
        assert_eq!(iter.cursor(), blocks[1].hash);
        assert!(matches!(iter.next_block(), Err(ChainError::StateCorruption(_))));
    }

    #[test]
    fn test_block_under_wrong_key_is_corruption() {
        let store = Arc::new(MemoryStore::new());
        let blocks = build_chain(store.as_ref(), 2);
        let bogus = Sha256Hash::from_bytes([9; 32]);
        store
            .put(bogus.as_bytes(), &codec::encode(&blocks[0]).unwrap())
            .unwrap();

        let mut iter = ChainIterator::new(store, Arc::new(BlockCache::new(8)), bogus);
        assert!(matches!(iter.next_block(), Err(ChainError::StateCorruption(_))));
    }

    #[test]
    fn test_cache_serves_repeat_walks() {
        let store = Arc::new(MemoryStore::new());
        let blocks = build_chain(store.as_ref(), 3);
        let cache = Arc::new(BlockCache::new(8));
        let head = blocks[2].hash;

        let first: Vec<Block> = ChainIterator::new(store.clone(), cache.clone(), head)
            .collect::<Result<_, _>>()
            .unwrap();
        let second: Vec<Block> = ChainIterator::new(store, cache.clone(), head)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 3);
    }
}
