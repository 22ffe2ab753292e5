//! ledgerchain - a single-node proof-of-work ledger over an unspent-output model
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, chain state, the backward iterator and the chain manager
//! - [`transaction`] - Transaction types, transfer construction and unspent-output queries
//!
//! ## Consensus
//! - [`miner`] - Nonce search against a leading-zero-bits target
//!
//! ## Cryptography
//! - [`crypto`] - SHA-256 hashes and addresses
//!
//! ## State Management
//! - [`persistence`] - Key-value store (SQLite and in-memory)
//! - [`cache`] - Decoded block cache
//! - [`codec`] - Binary encoding of stored values
//!
//! ## Integration
//! - [`api`] - Request/result service surface
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management & Persistence
// ============================================================================
pub mod cache;
pub mod codec;
pub mod persistence;

// ============================================================================
// Integration
// ============================================================================
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use api::Ledger;
pub use blockchain::{Block, BlockHeader, ChainIterator, ChainManager, ChainOptions, StartupMode};
pub use crypto::{Address, Sha256Hash};
pub use error::{ChainError, Result};
pub use transaction::{Transaction, TransferSpec, UtxoResolver};
