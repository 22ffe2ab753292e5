use super::chain::Block;
use super::iter::{load_block, ChainIterator};
use super::state::{ChainResolver, ChainState, PendingResolver, CHAIN_PENDING_KEY};
use super::validation::{validate_block, validate_no_double_spend};
use crate::cache::{BlockCache, CacheStats, DEFAULT_BLOCK_CACHE_SIZE};
use crate::codec;
use crate::config::Config;
use crate::crypto::{Address, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::miner::CancelToken;
use crate::persistence::{SqliteStore, Store, StoreOp};
use crate::transaction::{Transaction, TransferSpec};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_DIFFICULTY: u32 = 16;
pub const GENESIS_MEMO: &str = "Genesis Block Coinbase Transaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOptions {
    pub difficulty: u32,
    pub block_cache_size: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        ChainOptions {
            difficulty: DEFAULT_DIFFICULTY,
            block_cache_size: DEFAULT_BLOCK_CACHE_SIZE,
        }
    }
}

impl From<&Config> for ChainOptions {
    fn from(config: &Config) -> Self {
        ChainOptions {
            difficulty: config.miner.difficulty,
            block_cache_size: config.database.block_cache_size,
        }
    }
}

/// How the manager reached the ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    /// Empty store: a genesis block was created.
    Initialized,
    /// Existing chain state was loaded as-is.
    Loaded,
    /// Existing state was loaded and an interrupted append was resolved,
    /// either by adopting the block or by discarding it.
    Recovered { adopted: bool },
}

/// Owns the chain head and height, and is the only writer of the chain.
///
/// Appends are serialized by a writer lock held from reading the head until
/// the new state is persisted. Readers take a snapshot of the head and never
/// wait on a writer.
pub struct ChainManager {
    store: Arc<dyn Store>,
    cache: Arc<BlockCache>,
    state: RwLock<ChainState>,
    writer: Mutex<()>,
    difficulty: u32,
    shutdown: CancelToken,
    startup: StartupMode,
}

impl ChainManager {
    /// Load the chain from `store`, or create one with a genesis block if
    /// the store holds no chain state yet.
    pub fn open(store: Arc<dyn Store>, options: ChainOptions) -> Result<Self> {
        let cache = Arc::new(BlockCache::new(options.block_cache_size));
        let cancel = CancelToken::new();

        let (state, startup) = if ChainState::exists(store.as_ref())? {
            Self::load(store.as_ref(), &cache)
                .map_err(|e| Self::context(e, "failed to load existing blockchain"))?
        } else {
            let state = Self::init(store.as_ref(), &cache, options.difficulty, &cancel)
                .map_err(|e| Self::context(e, "failed to initialize new blockchain"))?;
            (state, StartupMode::Initialized)
        };

        info!(
            head = %state.head,
            height = state.height,
            mode = ?startup,
            "Chain manager ready"
        );

        Ok(ChainManager {
            store,
            cache,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            difficulty: options.difficulty,
            shutdown: cancel,
            startup,
        })
    }

    /// Open (or create) a sqlite-backed chain at `path`.
    pub fn open_path(path: impl AsRef<Path>, options: ChainOptions) -> Result<Self> {
        let path = path.as_ref();
        if SqliteStore::exists(path) {
            debug!(path = %path.display(), "Found existing database");
        }
        let store = SqliteStore::open(path)?;
        Self::open(Arc::new(store), options)
    }

    fn context(err: ChainError, what: &str) -> ChainError {
        match err {
            ChainError::StoreIo(msg) => ChainError::StoreIo(format!("{}: {}", what, msg)),
            ChainError::StateCorruption(msg) => {
                ChainError::StateCorruption(format!("{}: {}", what, msg))
            }
            other => other,
        }
    }

    fn init(
        store: &dyn Store,
        cache: &BlockCache,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<ChainState> {
        info!(difficulty, "New blockchain initialization, creating genesis block");

        let coinbase = Transaction::coinbase(&Address::miner(), GENESIS_MEMO);
        let genesis = Block::new(vec![coinbase], Sha256Hash::null(), 0, difficulty, cancel)?;

        store.put(genesis.hash.as_bytes(), &codec::encode(&genesis)?)?;

        let state = ChainState::genesis(genesis.hash);
        store.write_batch(&state.sync_ops()?)?;
        cache.insert(genesis);
        Ok(state)
    }

    fn load(store: &dyn Store, cache: &BlockCache) -> Result<(ChainState, StartupMode)> {
        let state = ChainState::load(store)?;

        let pending = match store.get(CHAIN_PENDING_KEY) {
            Ok(bytes) => Sha256Hash::from_slice(&bytes)?,
            Err(e) if e.is_not_found() => return Ok((state, StartupMode::Loaded)),
            Err(e) => return Err(e),
        };

        Self::recover_pending(store, cache, state, pending)
    }

    /// Resolve an append that was interrupted after its block was written.
    ///
    /// The block is adopted only if it is intact and extends the persisted
    /// head; anything else is discarded.
    fn recover_pending(
        store: &dyn Store,
        cache: &BlockCache,
        state: ChainState,
        pending: Sha256Hash,
    ) -> Result<(ChainState, StartupMode)> {
        if pending == state.head {
            store.delete(CHAIN_PENDING_KEY)?;
            return Ok((state, StartupMode::Recovered { adopted: false }));
        }

        let candidate = match load_block(store, cache, &pending) {
            Ok(block) => Some(block),
            Err(ChainError::StateCorruption(_)) | Err(ChainError::Serialization(_)) => None,
            Err(e) => return Err(e),
        };

        let adoptable = candidate.as_ref().is_some_and(|block| {
            block.header.prior_hash == state.head
                && block.height == state.height
                && validate_block(block).is_ok()
        });

        if adoptable {
            let next = state.advance(pending);
            store.write_batch(&next.sync_ops()?)?;
            warn!(block = %pending, height = next.height, "Adopted block from interrupted append");
            Ok((next, StartupMode::Recovered { adopted: true }))
        } else {
            store.write_batch(&[
                StoreOp::delete(pending.as_bytes().to_vec()),
                StoreOp::delete(CHAIN_PENDING_KEY),
            ])?;
            cache.remove(&pending);
            warn!(block = %pending, "Discarded orphan block from interrupted append");
            Ok((state, StartupMode::Recovered { adopted: false }))
        }
    }

    pub fn state(&self) -> ChainState {
        *self.state.read()
    }

    pub fn head(&self) -> Sha256Hash {
        self.state.read().head
    }

    pub fn height(&self) -> u64 {
        self.state.read().height
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn startup_mode(&self) -> StartupMode {
        self.startup
    }

    /// A token for one request. Cancelling it aborts only the append it is
    /// passed to; [`ChainManager::stop`] cancels every outstanding token.
    pub fn request_token(&self) -> CancelToken {
        self.shutdown.child()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Backward iterator from the current head.
    pub fn iter(&self) -> ChainIterator {
        self.iter_from(self.head())
    }

    pub fn iter_from(&self, head: Sha256Hash) -> ChainIterator {
        ChainIterator::new(self.store.clone(), self.cache.clone(), head)
    }

    /// Unspent-output queries against the current head.
    pub fn resolver(&self) -> ChainResolver {
        ChainResolver::new(self.store.clone(), self.cache.clone(), self.head())
    }

    pub fn get_block(&self, hash: &Sha256Hash) -> Result<Block> {
        load_block(self.store.as_ref(), &self.cache, hash)
    }

    /// Mine `transactions` into a new block on top of the head and persist it.
    pub fn add_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        self.add_block_with(transactions, &self.request_token())
    }

    /// [`ChainManager::add_block`] that gives up with
    /// [`ChainError::MiningCancelled`] once `cancel` fires.
    pub fn add_block_with(&self, transactions: Vec<Transaction>, cancel: &CancelToken) -> Result<Block> {
        let _writer = self.writer.lock();
        self.ensure_running()?;
        self.append_locked(transactions, cancel)
    }

    /// Build one transfer per spec against the current head and append them
    /// as a single block. Later specs may spend outputs created by earlier
    /// ones in the same call.
    pub fn add_transfers(&self, specs: &[TransferSpec]) -> Result<Block> {
        self.add_transfers_with(specs, &self.request_token())
    }

    pub fn add_transfers_with(&self, specs: &[TransferSpec], cancel: &CancelToken) -> Result<Block> {
        if specs.is_empty() {
            return Err(ChainError::EmptyBlock);
        }

        let _writer = self.writer.lock();
        self.ensure_running()?;
        let committed = self.resolver();
        let mut pending = PendingResolver::new(&committed);
        for spec in specs {
            let tx = spec.build(&pending)?;
            debug!(from = %spec.from, to = %spec.to, amount = spec.amount, tx = %tx.id(), "Built transfer");
            pending.push(tx);
        }

        self.append_locked(pending.into_transactions(), cancel)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(ChainError::StoreIo("chain manager is stopped".to_string()));
        }
        Ok(())
    }

    // Caller must hold the writer lock.
    fn append_locked(&self, transactions: Vec<Transaction>, cancel: &CancelToken) -> Result<Block> {
        if transactions.is_empty() {
            return Err(ChainError::EmptyBlock);
        }
        for tx in &transactions {
            tx.validate_structure()?;
        }
        validate_no_double_spend(&transactions)?;

        let current = self.state();
        let block = Block::new(
            transactions,
            current.head,
            current.height,
            self.difficulty,
            cancel,
        )?;
        let encoded = codec::encode(&block)?;

        // Block first, state second: a failure in between leaves an orphan
        // that the pending marker lets the next startup resolve.
        self.store.put(CHAIN_PENDING_KEY, block.hash.as_bytes())?;
        self.store.put(block.hash.as_bytes(), &encoded)?;

        let next = current.advance(block.hash);
        self.store.write_batch(&next.sync_ops()?)?;
        *self.state.write() = next;
        self.cache.insert(block.clone());

        info!(
            height = block.height,
            hash = %block.hash,
            nonce = block.header.nonce,
            txns = block.txn_count(),
            "Appended block"
        );
        Ok(block)
    }

    /// Walk the whole chain and check every block and every link.
    ///
    /// Returns the number of blocks verified.
    pub fn verify_chain(&self) -> Result<u64> {
        let snapshot = self.state();
        let mut expected_hash = snapshot.head;
        let mut verified = 0u64;

        for block in self.iter_from(snapshot.head) {
            let block = block?;
            let expected_height = snapshot.height.checked_sub(verified + 1).ok_or_else(|| {
                ChainError::StateCorruption(format!(
                    "chain holds more blocks than its recorded height {}",
                    snapshot.height
                ))
            })?;

            if block.hash != expected_hash {
                return Err(ChainError::StateCorruption(format!(
                    "expected block {} but found {}",
                    expected_hash, block.hash
                )));
            }
            if block.height != expected_height {
                return Err(ChainError::StateCorruption(format!(
                    "block {} has height {}, expected {}",
                    block.hash, block.height, expected_height
                )));
            }
            validate_block(&block)?;

            expected_hash = block.header.prior_hash;
            verified += 1;
        }

        if verified != snapshot.height {
            return Err(ChainError::StateCorruption(format!(
                "walked {} blocks but recorded height is {}",
                verified, snapshot.height
            )));
        }

        debug!(blocks = verified, "Chain verified");
        Ok(verified)
    }

    /// Cancel any in-flight mining and release the store. Later appends and
    /// store reads fail with [`ChainError::StoreIo`].
    pub fn stop(&self) -> Result<()> {
        self.shutdown.cancel();
        // Waits for an in-flight append to observe the cancel.
        let _writer = self.writer.lock();
        self.cache.clear();
        self.store.close()?;
        info!(head = %self.head(), height = self.height(), "Chain manager stopped");
        Ok(())
    }
}

impl fmt::Display for ChainManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state();
        write!(f, "Chain Head: {} || Chain Height: {}", state.head, state.height)
    }
}
