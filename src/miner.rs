//! Proof-of-work mining
//!
//! A header is minted by searching nonces from zero upwards until its digest
//! has at least `difficulty` leading zero bits. The search runs on the
//! calling thread and checks a [`CancelToken`] before every attempt, so a
//! shutdown or an abandoned request never blocks indefinitely.

use crate::blockchain::BlockHeader;
use crate::crypto::Sha256Hash;
use crate::error::{ChainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Upper bound on the difficulty accepted from configuration.
pub const MAX_DIFFICULTY: u32 = 64;

/// Shared cancellation flag for in-flight mining.
///
/// A token made with [`CancelToken::child`] is also cancelled whenever its
/// parent is, which lets one request be aborted without touching the parent
/// while a parent cancel still reaches every child.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh token that also observes `self`.
    pub fn child(&self) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

/// Whether `hash` satisfies the leading-zero-bits predicate.
pub fn meets_difficulty(hash: &Sha256Hash, difficulty: u32) -> bool {
    hash.leading_zero_bits() >= difficulty
}

/// Search for a nonce that makes `header` satisfy its own difficulty.
///
/// On success the winning nonce is stored in the header and its digest is
/// returned as the block hash. Nothing is kept between calls.
pub fn mint(header: &mut BlockHeader, cancel: &CancelToken) -> Result<Sha256Hash> {
    let start = Instant::now();
    let mut nonce: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(attempts = nonce, "Mining cancelled");
            return Err(ChainError::MiningCancelled);
        }

        header.nonce = nonce;
        let candidate = header.hash();
        if meets_difficulty(&candidate, header.difficulty) {
            debug!(
                nonce,
                difficulty = header.difficulty,
                elapsed = %humantime::format_duration(start.elapsed()),
                "Found proof of work"
            );
            return Ok(candidate);
        }

        nonce = nonce.checked_add(1).ok_or_else(|| {
            ChainError::InvalidBlock("Nonce space exhausted without meeting difficulty".to_string())
        })?;
    }
}
