//! Concurrent writers and readers against one chain manager

use ledgerchain::api::{AddBlockRequest, Ledger, TransferRequest};
use ledgerchain::blockchain::ChainOptions;
use ledgerchain::persistence::MemoryStore;
use ledgerchain::transaction::UtxoResolver;
use ledgerchain::{Address, ChainManager};
use std::sync::Arc;
use std::thread;

#[test]
fn test_parallel_add_blocks_serialize() {
    let options = ChainOptions {
        difficulty: 4,
        block_cache_size: 32,
    };
    let chain = Arc::new(ChainManager::open(Arc::new(MemoryStore::new()), options).unwrap());
    let ledger = Ledger::from_shared(chain.clone());

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    let request = AddBlockRequest {
                        transactions: vec![TransferRequest {
                            from: "miner".to_string(),
                            to: format!("worker-{}", i),
                            value: 2,
                        }],
                    };
                    ledger.add_block(&request).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                let shown = ledger.show_chain().unwrap();
                assert_eq!(shown.blocks.len() as u64, shown.chain_height);
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(chain.height(), 13);
    assert_eq!(chain.verify_chain().unwrap(), 13);

    let resolver = chain.resolver();
    assert_eq!(resolver.balance(&Address::miner()).unwrap(), 100 - 24);
    for i in 0..4 {
        let worker = Address::from(format!("worker-{}", i));
        assert_eq!(resolver.balance(&worker).unwrap(), 6);
    }
}
