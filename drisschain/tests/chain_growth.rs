// Copyright (c) 2024 The Drisschain Developers
//
//! Multi-block behaviour: difficulty retargeting across a full window,
//! restart from disk, block-by-block sync between two nodes and gossip
//! deduplication.

mod common;

use num_bigint::BigUint;

use common::*;
use drisschain::config::ChainParams;
use drisschain::ledger::Ledger;
use drisschain::node::{BlockOutcome, NodeState};

fn fast_params(first_account: &str) -> ChainParams {
    ChainParams {
        block_time_ms: 1,
        ..test_params(first_account)
    }
}

#[test]
fn retarget_is_applied_and_persisted() {
    let (dir, mut node) = open_node(fast_params("abc"));
    node.bootstrap().unwrap();

    // Blocks 2..=10, one millisecond apart: the window 1..=10 spans 9 ms.
    for _ in 2..=10 {
        let block = mine_next(&node, "miner");
        assert_eq!(node.submit_block(block).unwrap(), BlockOutcome::Accepted);
    }
    assert_eq!(node.chain.height(), 10);
    // ceil(1 * 10 * 1 / 9)
    assert_eq!(node.chain.difficulty, 2);

    // Block 11 must carry the new difficulty.
    let block = mine_next(&node, "miner");
    assert_eq!(block.difficulty, 2);
    node.submit_block(block).unwrap();

    let tip = node.chain.latest_block.clone().unwrap();
    drop(node);

    let ledger = Ledger::open(dir.path()).unwrap();
    let reopened = NodeState::open(ledger, fast_params("abc"), false).unwrap();
    assert_eq!(reopened.chain.difficulty, 2);
    assert_eq!(reopened.chain.latest_block, Some(tip));
    assert_eq!(
        reopened.balance_of("miner").unwrap(),
        Some(&reopened.params.block_reward * BigUint::from(10u32))
    );
}

#[test]
fn fresh_node_syncs_block_by_block() {
    let alice = TestAccount::generate();
    let bob = TestAccount::generate();
    let (_src_dir, mut source) = funded_node(&alice);

    for nonce in 1..=3 {
        source
            .submit_transaction(alice.transfer(&bob.address, 10 * nonce, nonce))
            .unwrap();
        let block = mine_next(&source, "miner");
        source.submit_block(block).unwrap();
    }
    assert_eq!(source.chain.height(), 4);

    let (_dir, mut fresh) = open_node(ChainParams {
        genesis_timestamp: None,
        ..test_params(&alice.address)
    });
    let mut next = fresh.start_sync().unwrap();
    assert_eq!(next, 1);

    while let Some(block) = source.request_block_at(next).unwrap() {
        assert_eq!(fresh.accept_sync_block(block.clone()).unwrap(), BlockOutcome::Accepted);
        // A second reply with the same block is ignored.
        assert_eq!(fresh.accept_sync_block(block).unwrap(), BlockOutcome::AlreadySeen);
        next += 1;
    }

    assert_eq!(fresh.chain.height(), 4);
    assert_eq!(fresh.chain.tip_hash(), source.chain.tip_hash());
    assert_eq!(balance(&fresh, &bob.address), BigUint::from(60u32));
    assert_eq!(
        balance(&fresh, &alice.address),
        balance(&source, &alice.address)
    );
    assert_eq!(nonce(&fresh, &alice.address), 3);
}

#[test]
fn redelivered_block_is_a_no_op() {
    let alice = TestAccount::generate();
    let (_dir, mut node) = funded_node(&alice);

    let block = mine_next(&node, "miner");
    assert_eq!(node.submit_block(block.clone()).unwrap(), BlockOutcome::Accepted);
    let reward = balance(&node, "miner");

    for _ in 0..3 {
        assert_eq!(
            node.submit_block(block.clone()).unwrap(),
            BlockOutcome::AlreadySeen
        );
    }
    assert_eq!(balance(&node, "miner"), reward);
    assert_eq!(node.chain.height(), 2);
}

#[test]
fn rejected_block_is_not_verified_again() {
    let alice = TestAccount::generate();
    let (_dir, mut node) = funded_node(&alice);

    let mut block = mine_next(&node, "miner");
    block.timestamp += 1;
    assert!(node.submit_block(block.clone()).is_err());
    assert_eq!(node.submit_block(block).unwrap(), BlockOutcome::AlreadySeen);
    assert_eq!(node.chain.height(), 1);
}
