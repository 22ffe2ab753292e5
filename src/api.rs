//! Transport-agnostic service surface over the chain manager.
//!
//! Request and result types are serde structs so any transport (CLI, JSON-RPC,
//! HTTP) can carry them unchanged.

use crate::blockchain::{Block, ChainManager};
use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::miner::CancelToken;
use crate::transaction::{total_value, Transaction, TransferSpec, UtxoResolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One requested transfer inside an [`AddBlockRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub value: u64,
}

impl From<&TransferRequest> for TransferSpec {
    fn from(req: &TransferRequest) -> Self {
        TransferSpec::new(req.from.as_str(), req.to.as_str(), req.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBlockRequest {
    pub transactions: Vec<TransferRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBlockResult {
    /// Height of the new block; genesis is 0.
    pub block_height: u64,
    pub block_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBlock {
    pub height: u64,
    pub nonce: u64,
    pub timestamp: String,
    pub block_hash: String,
    pub prev_block_hash: String,
    pub txn_count: usize,
    pub transactions: Vec<Transaction>,
}

impl From<Block> for ChainBlock {
    fn from(block: Block) -> Self {
        ChainBlock {
            height: block.height,
            nonce: block.header.nonce,
            timestamp: block.timestamp_rfc3339(),
            block_hash: block.hash.to_hex(),
            prev_block_hash: block.header.prior_hash.to_hex(),
            txn_count: block.txn_count(),
            transactions: block.transactions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowChainResult {
    pub chain_head: String,
    pub chain_height: u64,
    /// Newest first.
    pub blocks: Vec<ChainBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub address: String,
    pub balance: u64,
    pub utxo_count: usize,
}

/// Shared handle to a running chain.
#[derive(Clone)]
pub struct Ledger {
    chain: Arc<ChainManager>,
}

impl Ledger {
    pub fn new(chain: ChainManager) -> Self {
        Ledger { chain: Arc::new(chain) }
    }

    pub fn from_shared(chain: Arc<ChainManager>) -> Self {
        Ledger { chain }
    }

    pub fn chain(&self) -> &Arc<ChainManager> {
        &self.chain
    }

    /// Token for one request; cancelling it aborts only that request's mining.
    pub fn request_token(&self) -> CancelToken {
        self.chain.request_token()
    }

    /// Build one transfer per requested entry and mine them into one block.
    pub fn add_block(&self, request: &AddBlockRequest) -> Result<AddBlockResult> {
        self.add_block_with(request, &self.request_token())
    }

    pub fn add_block_with(&self, request: &AddBlockRequest, cancel: &CancelToken) -> Result<AddBlockResult> {
        info!(transfers = request.transactions.len(), "'AddBlock' called");
        if request.transactions.is_empty() {
            return Err(ChainError::EmptyBlock);
        }

        let specs: Vec<TransferSpec> = request.transactions.iter().map(TransferSpec::from).collect();
        let block = self.chain.add_transfers_with(&specs, cancel)?;

        Ok(AddBlockResult {
            block_height: block.height,
            block_hash: block.hash.to_hex(),
        })
    }

    /// Every block from head to genesis.
    pub fn show_chain(&self) -> Result<ShowChainResult> {
        info!("'ShowChain' called");
        let state = self.chain.state();
        let blocks = self
            .chain
            .iter_from(state.head)
            .map(|block| block.map(ChainBlock::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(ShowChainResult {
            chain_head: state.head.to_hex(),
            chain_height: state.height,
            blocks,
        })
    }

    pub fn balance(&self, address: &str) -> Result<BalanceResult> {
        let address = Address::from(address);
        let utxos = self.chain.resolver().find_utxo(&address)?;
        Ok(BalanceResult {
            balance: total_value(&address, utxos.iter().map(|o| o.value))?,
            utxo_count: utxos.len(),
            address: address.to_string(),
        })
    }

    /// Stop the shared chain: aborts mining, waits for the writer and closes
    /// the store. Every clone of this handle sees the stopped chain.
    pub fn stop(&self) -> Result<()> {
        self.chain.stop()
    }
}
