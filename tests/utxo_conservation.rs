//! Randomized transfer sequences keep total value constant and never let an
//! output be spent twice.

use ledgerchain::blockchain::ChainOptions;
use ledgerchain::error::ChainError;
use ledgerchain::persistence::MemoryStore;
use ledgerchain::transaction::{OutPoint, TransferSpec, UtxoResolver, COINBASE_REWARD};
use ledgerchain::{Address, ChainManager};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const ACCOUNTS: [&str; 5] = ["miner", "alice", "bob", "carol", "dave"];

fn open_chain() -> ChainManager {
    let options = ChainOptions {
        difficulty: 2,
        block_cache_size: 64,
    };
    ChainManager::open(Arc::new(MemoryStore::new()), options).unwrap()
}

/// Balances rebuilt by replaying every block oldest first, without the
/// resolver's backward scan.
fn replayed_balances(chain: &ChainManager) -> HashMap<String, u64> {
    let mut blocks: Vec<_> = chain.iter().collect::<Result<_, _>>().unwrap();
    blocks.reverse();

    let mut outputs: HashMap<OutPoint, (String, u64)> = HashMap::new();
    let mut totals: HashMap<String, u64> = HashMap::new();
    for block in blocks {
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for outpoint in tx.inputs().iter().filter_map(|i| i.outpoint()) {
                    let (owner, value) = outputs.remove(&outpoint).expect("input spends a known output");
                    *totals.get_mut(&owner).unwrap() -= value;
                }
            }
            for (index, output) in tx.outputs().iter().enumerate() {
                let owner = output.owner.as_str().to_string();
                *totals.entry(owner.clone()).or_default() += output.value;
                outputs.insert(OutPoint::new(tx.id(), index as u32), (owner, output.value));
            }
        }
    }
    totals
}

fn balances(chain: &ChainManager) -> Vec<u64> {
    let resolver = chain.resolver();
    ACCOUNTS
        .iter()
        .map(|a| resolver.balance(&Address::from(*a)).unwrap())
        .collect()
}

#[test]
fn test_random_transfers_conserve_value() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let chain = open_chain();

    for _ in 0..25 {
        let before = balances(&chain);
        let from = rng.gen_range(0..ACCOUNTS.len());
        let to = rng.gen_range(0..ACCOUNTS.len());
        let overdraw = rng.gen_bool(0.2);
        let amount = if overdraw {
            before[from] + rng.gen_range(1..10)
        } else if before[from] == 0 {
            continue;
        } else {
            rng.gen_range(1..=before[from])
        };

        let result = chain.add_transfers(&[TransferSpec::new(ACCOUNTS[from], ACCOUNTS[to], amount)]);
        let after = balances(&chain);

        if overdraw {
            assert!(matches!(result, Err(ChainError::InsufficientFunds { .. })));
            assert_eq!(after, before);
        } else {
            result.unwrap();
            if from != to {
                assert_eq!(after[from], before[from] - amount);
                assert_eq!(after[to], before[to] + amount);
            } else {
                assert_eq!(after, before);
            }
        }
        assert_eq!(after.iter().sum::<u64>(), COINBASE_REWARD);
    }

    chain.verify_chain().unwrap();

    let replayed = replayed_balances(&chain);
    for (account, balance) in ACCOUNTS.iter().zip(balances(&chain)) {
        assert_eq!(
            replayed.get(*account).copied().unwrap_or(0),
            balance,
            "replayed balance of {}",
            account
        );
    }
}

#[test]
fn test_no_output_is_spent_twice() {
    let mut rng = StdRng::seed_from_u64(42);
    let chain = open_chain();

    for _ in 0..15 {
        let current = balances(&chain);
        let funded: Vec<usize> = (0..ACCOUNTS.len()).filter(|&i| current[i] > 0).collect();
        let from = funded[rng.gen_range(0..funded.len())];
        let to = rng.gen_range(0..ACCOUNTS.len());
        let amount = rng.gen_range(1..=current[from]);
        chain
            .add_transfers(&[TransferSpec::new(ACCOUNTS[from], ACCOUNTS[to], amount)])
            .unwrap();
    }

    let mut spent: HashSet<OutPoint> = HashSet::new();
    for block in chain.iter() {
        for tx in block.unwrap().transactions {
            for outpoint in tx.inputs().iter().filter_map(|i| i.outpoint()) {
                assert!(spent.insert(outpoint), "{:?} spent twice", outpoint);
            }
        }
    }
}

#[test]
fn test_batched_transfers_chain_change_outputs() {
    let chain = open_chain();
    let block = chain
        .add_transfers(&[
            TransferSpec::new("miner", "alice", 60),
            TransferSpec::new("miner", "bob", 30),
            TransferSpec::new("alice", "carol", 25),
        ])
        .unwrap();
    assert_eq!(block.txn_count(), 3);

    assert_eq!(balances(&chain), vec![10, 35, 30, 25, 0]);

    // The miner's remaining 10 cannot cover two transfers of 8 in one block.
    let result = chain.add_transfers(&[
        TransferSpec::new("miner", "dave", 8),
        TransferSpec::new("miner", "dave", 8),
    ]);
    assert!(matches!(
        result,
        Err(ChainError::InsufficientFunds { available: 2, .. })
    ));
    assert_eq!(chain.height(), 2);
}
