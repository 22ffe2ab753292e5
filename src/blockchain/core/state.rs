use super::iter::ChainIterator;
use crate::cache::BlockCache;
use crate::codec;
use crate::crypto::{Address, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::persistence::{Store, StoreOp};
use crate::transaction::{
    add_value, OutPoint, SpendableOutputs, Transaction, UnspentOutput, UtxoResolver,
};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Reserved store keys. These are part of the on-disk schema.
pub const CHAIN_HEAD_KEY: &[u8] = b"chain:head";
pub const CHAIN_HEIGHT_KEY: &[u8] = b"chain:height";
/// Hash of a block whose append has started but whose state sync has not
/// completed yet.
pub const CHAIN_PENDING_KEY: &[u8] = b"chain:pending";

/// Persisted pointer to the tip of the chain.
///
/// `height` counts blocks, so `head` is the hash of the block at height
/// `height - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ChainState {
    pub head: Sha256Hash,
    pub height: u64,
}

impl ChainState {
    pub fn genesis(genesis_hash: Sha256Hash) -> Self {
        ChainState { head: genesis_hash, height: 1 }
    }

    /// State after appending `block_hash` on top of this one.
    pub fn advance(&self, block_hash: Sha256Hash) -> Self {
        ChainState { head: block_hash, height: self.height + 1 }
    }

    /// Whether a chain state has been persisted to `store`.
    pub fn exists(store: &dyn Store) -> Result<bool> {
        store.contains(CHAIN_HEAD_KEY)
    }

    pub fn load(store: &dyn Store) -> Result<Self> {
        let head_bytes = store.get(CHAIN_HEAD_KEY)?;
        let height_bytes = store.get(CHAIN_HEIGHT_KEY)?;

        let head = Sha256Hash::from_slice(&head_bytes)?;
        let height: u64 = codec::decode(&height_bytes)?;

        if head.is_null() || height == 0 {
            return Err(ChainError::StateCorruption(format!(
                "persisted chain state is empty (head {}, height {})",
                head, height
            )));
        }

        Ok(ChainState { head, height })
    }

    /// Writes that persist this state and clear any pending marker, to be
    /// applied as one batch.
    pub fn sync_ops(&self) -> Result<Vec<StoreOp>> {
        Ok(vec![
            StoreOp::put(CHAIN_HEAD_KEY, self.head.as_bytes().to_vec()),
            StoreOp::put(CHAIN_HEIGHT_KEY, codec::encode(&self.height)?),
            StoreOp::delete(CHAIN_PENDING_KEY),
        ])
    }
}

/// Resolves unspent outputs by replaying the chain from a fixed head.
///
/// Blocks are visited newest first and, inside a block, last transaction
/// first. Every output referenced by a visited input is recorded as spent,
/// so an output reported as unspent was never referenced by anything that
/// comes after it in chain order.
pub struct ChainResolver {
    store: Arc<dyn Store>,
    cache: Arc<BlockCache>,
    head: Sha256Hash,
}

impl ChainResolver {
    pub fn new(store: Arc<dyn Store>, cache: Arc<BlockCache>, head: Sha256Hash) -> Self {
        ChainResolver { store, cache, head }
    }

    pub fn head(&self) -> Sha256Hash {
        self.head
    }

    fn scan<F>(&self, address: &Address, mut visit: F) -> Result<()>
    where
        F: FnMut(&Transaction, UnspentOutput) -> ControlFlow<()>,
    {
        let mut spent: HashMap<Sha256Hash, HashSet<u32>> = HashMap::new();
        let blocks = ChainIterator::new(self.store.clone(), self.cache.clone(), self.head);

        for block in blocks {
            let block = block?;
            // Later transactions first: a spend in the same block as its
            // source must be recorded before the source's outputs are seen.
            for tx in block.transactions.iter().rev() {
                let tx_id = tx.id();
                for (index, output) in tx.outputs().iter().enumerate() {
                    let index = index as u32;
                    if spent.get(&tx_id).is_some_and(|s| s.contains(&index)) {
                        continue;
                    }
                    if output.can_be_unlocked(address) {
                        let unspent = UnspentOutput {
                            outpoint: OutPoint::new(tx_id, index),
                            output: output.clone(),
                        };
                        if visit(tx, unspent).is_break() {
                            return Ok(());
                        }
                    }
                }

                if !tx.is_coinbase() {
                    for outpoint in tx.inputs().iter().filter_map(|i| i.outpoint()) {
                        spent.entry(outpoint.tx_id).or_default().insert(outpoint.index);
                    }
                }
            }
        }

        Ok(())
    }
}

impl UtxoResolver for ChainResolver {
    fn find_unspent_transactions(&self, address: &Address) -> Result<Vec<Transaction>> {
        let mut seen = HashSet::new();
        let mut transactions = Vec::new();
        self.scan(address, |tx, _| {
            if seen.insert(tx.id()) {
                transactions.push(tx.clone());
            }
            ControlFlow::Continue(())
        })?;
        Ok(transactions)
    }

    fn find_unspent_outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>> {
        let mut found = Vec::new();
        self.scan(address, |_, unspent| {
            found.push(unspent);
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    // Outputs found while walking backwards are already known to be
    // unspent, so the walk can stop as soon as the amount is covered.
    fn find_spendable_outputs(&self, address: &Address, amount: u64) -> Result<SpendableOutputs> {
        let mut selected = SpendableOutputs::default();
        let mut overflow = None;
        self.scan(address, |_, unspent| {
            if selected.accumulated >= amount {
                return ControlFlow::Break(());
            }
            match add_value(address, selected.accumulated, unspent.output.value) {
                Ok(total) => selected.accumulated = total,
                Err(e) => {
                    overflow = Some(e);
                    return ControlFlow::Break(());
                }
            }
            selected.outpoints.push(unspent.outpoint);
            if selected.accumulated >= amount {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        if let Some(e) = overflow {
            return Err(e);
        }
        Ok(selected)
    }
}

/// Layers transactions that are built but not yet committed on top of a
/// resolver, so several transfers can go into one block without selecting
/// the same output twice.
///
/// Pending transactions count as newer than anything in `base`.
pub struct PendingResolver<'a> {
    base: &'a dyn UtxoResolver,
    pending: Vec<Transaction>,
}

impl<'a> PendingResolver<'a> {
    pub fn new(base: &'a dyn UtxoResolver) -> Self {
        PendingResolver { base, pending: Vec::new() }
    }

    pub fn push(&mut self, tx: Transaction) {
        self.pending.push(tx);
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.pending
    }

    /// Unspent pending outputs for `address` (newest first) and every
    /// outpoint the pending transactions spend.
    fn pending_view(&self, address: &Address) -> (Vec<(usize, UnspentOutput)>, HashSet<OutPoint>) {
        let mut spent = HashSet::new();
        let mut found = Vec::new();

        for (position, tx) in self.pending.iter().enumerate().rev() {
            for (index, output) in tx.outputs().iter().enumerate() {
                let outpoint = OutPoint::new(tx.id(), index as u32);
                if !spent.contains(&outpoint) && output.can_be_unlocked(address) {
                    found.push((position, UnspentOutput { outpoint, output: output.clone() }));
                }
            }
            if !tx.is_coinbase() {
                spent.extend(tx.inputs().iter().filter_map(|i| i.outpoint()));
            }
        }

        (found, spent)
    }
}

impl UtxoResolver for PendingResolver<'_> {
    fn find_unspent_transactions(&self, address: &Address) -> Result<Vec<Transaction>> {
        let (found, spent) = self.pending_view(address);

        let mut transactions: Vec<Transaction> = Vec::new();
        for (position, _) in found {
            let tx = &self.pending[position];
            if transactions.last().map(|t| t.id()) != Some(tx.id()) {
                transactions.push(tx.clone());
            }
        }

        for tx in self.base.find_unspent_transactions(address)? {
            let still_unspent = tx.outputs().iter().enumerate().any(|(index, output)| {
                output.can_be_unlocked(address)
                    && !spent.contains(&OutPoint::new(tx.id(), index as u32))
            });
            if still_unspent {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn find_unspent_outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>> {
        let (found, spent) = self.pending_view(address);
        let mut outputs: Vec<UnspentOutput> = found.into_iter().map(|(_, u)| u).collect();
        outputs.extend(
            self.base
                .find_unspent_outputs(address)?
                .into_iter()
                .filter(|u| !spent.contains(&u.outpoint)),
        );
        Ok(outputs)
    }
}
