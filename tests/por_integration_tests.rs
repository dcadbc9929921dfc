//! Proof-of-payment integration tests
//!
//! Drives the public engine API end to end against an on-disk sled store:
//! mine a source block, commit the mining transaction, let the window
//! mature, claim, and follow the commission up the referral tree.

use por_bridge::config::EngineConfig;
use por_bridge::core::bounty::BountyProof;
use por_bridge::core::header::BlockHeader;
use por_bridge::core::merkle::MerkleTree;
use por_bridge::core::referral::{ESCALATE_WINDOW, RATE_SCALE, WEEK};
use por_bridge::core::reward::{base_reward, PAY_RATE_SCALE};
use por_bridge::core::target::hash_value;
use por_bridge::core::transaction::{script, TxInput, TxOutput};
use por_bridge::core::{
    AccountId, Amount, BlockRef, ClaimRequest, CommitProof, Event, Hash256, PorEngine, PubKeyHash,
    TxFields,
};
use por_bridge::ledger::{CampaignBook, MemoryLedger};
use por_bridge::utils::ManualClock;
use por_bridge::PorError;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tempfile::{tempdir, TempDir};

const T0: u32 = 1_700_000_000;
const EASY_BITS: u32 = 0x1f00ffff;
const BRAND: &[u8] = b"endur.io";

type Engine = PorEngine<MemoryLedger, CampaignBook>;

fn account(n: u8) -> AccountId {
    let mut id = [n; 20];
    id[0] = 0xee;
    AccountId(id)
}

fn public_key(seed: u8) -> PublicKey {
    let mut raw = [0u8; 32];
    raw[0] = 2;
    raw[31] = seed;
    let secret = SecretKey::from_slice(&raw).unwrap();
    PublicKey::from_secret_key(&Secp256k1::new(), &secret)
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        db_path: dir.path().join("por").to_string_lossy().into_owned(),
        native_pay_rate: 1000 * PAY_RATE_SCALE,
        engine_account: account(200),
        treasury: account(201),
        ..EngineConfig::default()
    }
}

fn open(config: &EngineConfig, clock: &ManualClock) -> Engine {
    PorEngine::open(
        config.clone(),
        MemoryLedger::new(),
        CampaignBook::new(),
        Box::new(clock.clone()),
    )
    .unwrap()
}

fn pay(n: u8, value: u64) -> TxOutput {
    TxOutput {
        value,
        script: script::p2pkh(&PubKeyHash([n; 20])),
    }
}

fn spend(public: &PublicKey, n: u8) -> TxInput {
    TxInput {
        prev_txid: [n; 32],
        prev_index: 0,
        script: script::p2pkh_sig(&[0x30; 71], &public.serialize()),
        sequence: 0xffff_ffff,
    }
}

fn memo_tx(input: TxInput, extra: Vec<TxOutput>) -> TxFields {
    let mut outputs = vec![TxOutput {
        value: 0,
        script: script::op_return(BRAND),
    }];
    outputs.extend(extra);
    outputs.push(pay(0xcc, 10_000));
    TxFields::build(2, &[input], &outputs, 0)
}

/// Mine `txs` behind a coinbase; returns the header and the tree
fn mine(txs: &[TxFields], timestamp: u32, prev_hash: Hash256) -> (Vec<u8>, MerkleTree) {
    let coinbase = TxFields::build(
        1,
        &[TxInput {
            prev_txid: [0u8; 32],
            prev_index: u32::MAX,
            script: vec![timestamp as u8],
            sequence: 0xffff_ffff,
        }],
        &[pay(0xbb, 5_000_000_000)],
        0,
    );
    let mut leaves = vec![coinbase.txid()];
    leaves.extend(txs.iter().map(TxFields::txid));
    let tree = MerkleTree::from_leaves(&leaves).unwrap();
    let mut header = BlockHeader {
        version: 0x2000_0000,
        prev_hash,
        merkle_root: tree.root(),
        timestamp,
        bits: EASY_BITS,
        nonce: 0,
    };
    while header.verify_work().is_err() {
        header.nonce += 1;
    }
    (header.serialize().to_vec(), tree)
}

fn proof_for(header: &[u8], tree: &MerkleTree, index: u32, tx: &TxFields) -> CommitProof {
    CommitProof {
        block: BlockRef::Header(header.to_vec()),
        merkle_proof: tree.proof(index).unwrap().branch,
        merkle_index: index,
        tx: tx.clone(),
        memo_length: 0,
        input_index: 0,
        pubkey_pos: 0,
        payer: None,
    }
}

#[test]
fn test_commit_claim_commission_lifecycle() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    let clock = ManualClock::new(u64::from(T0));
    let public = public_key(1);
    let miner = AccountId::from_public_key(&public);
    let beneficiary = account(10);
    let sponsor = account(11);

    let key = {
        let mut engine = open(&config, &clock);
        // the key owner routes rewards elsewhere
        engine
            .register_identity(&miner, &public.serialize(), Some(beneficiary))
            .unwrap();
        engine.attach(&beneficiary, &sponsor).unwrap();
        // a first rent is always an escalation
        let fund = (WEEK + ESCALATE_WINDOW) as Amount;
        engine.ledger_mut().fund(None, sponsor, fund).unwrap();
        assert_eq!(
            engine.update(&sponsor, fund as i128, 1, false).map(|_| ()),
            Err(PorError::NoEscalate)
        );
        let (rent, _) = engine.update(&sponsor, fund as i128, 1, true).unwrap();
        assert_eq!(rent.fee, ESCALATE_WINDOW as Amount);
        assert_eq!(rent.expiration, u64::from(T0) + WEEK);

        let tx = memo_tx(spend(&public, 1), Vec::new());
        let (header, tree) = mine(std::slice::from_ref(&tx), T0, [1u8; 32]);
        let receipt = engine
            .commit(&proof_for(&header, &tree, 1, &tx), None, None)
            .unwrap();
        engine.flush().unwrap();
        receipt.key
    };

    // the ledger is external; only the engine's own tables survive
    let mut engine = open(&config, &clock);
    let pending = engine.pending(&key).cloned().unwrap();
    assert_eq!(
        pending.amount,
        base_reward(EASY_BITS, config.native_pay_rate).unwrap()
    );
    let request = ClaimRequest::for_pending(&key, &pending);
    assert_eq!(engine.claim(&request), Err(PorError::TooSoon));

    clock.advance(config.commit_window_secs);
    let events = engine.claim(&request).unwrap();
    let commission = pending.amount * config.commission_rate / RATE_SCALE;
    assert_eq!(engine.ledger().balance_of(None, &beneficiary), pending.amount);
    assert_eq!(engine.ledger().balance_of(None, &sponsor), commission);
    assert!(events.contains(&Event::CommissionPaid {
        miner: beneficiary,
        payee: sponsor,
        value: commission,
    }));
    engine.flush().unwrap();
    drop(engine);

    let mut engine = open(&config, &clock);
    assert!(engine.pending(&key).unwrap().consumed);
    assert_eq!(engine.claim(&request), Err(PorError::Claimed));
}

#[test]
fn test_better_commit_replaces_pending_claim() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    let clock = ManualClock::new(u64::from(T0));
    let mut engine = open(&config, &clock);

    let txs: Vec<TxFields> = (1..=4)
        .map(|seed| {
            let public = public_key(seed);
            engine
                .register_identity(&account(1), &public.serialize(), None)
                .unwrap();
            memo_tx(spend(&public, seed), Vec::new())
        })
        .collect();
    let (header, tree) = mine(&txs, T0, [2u8; 32]);
    engine.commit_block(&header).unwrap();
    let block_hash = BlockHeader::parse(&header).unwrap().hash();

    // weakest first, so every later commit displaces the one before it
    let mut order: Vec<usize> = (0..txs.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(hash_value(&txs[i].txid())));
    let mut winner = None;
    for &i in &order {
        let mut proof = proof_for(&header, &tree, i as u32 + 1, &txs[i]);
        proof.block = BlockRef::Committed(block_hash);
        let receipt = engine.commit(&proof, None, None).unwrap();
        assert_eq!(
            receipt.events.last().and_then(|e| match e {
                Event::Committed { replaced, .. } => Some(replaced.is_some()),
                _ => None,
            }),
            Some(winner.is_some())
        );
        winner = Some((receipt.key, txs[i].txid()));
    }

    let (key, best) = winner.unwrap();
    assert_eq!(engine.pending(&key).unwrap().txid, best);

    // the weakest tx can no longer displace the winner
    let weakest = order[0];
    let mut proof = proof_for(&header, &tree, weakest as u32 + 1, &txs[weakest]);
    proof.block = BlockRef::Committed(block_hash);
    assert_eq!(engine.commit(&proof, None, None).map(|_| ()), Err(PorError::Taken));
}

#[test]
fn test_bounty_commit_multiplies_reward() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    let clock = ManualClock::new(u64::from(T0));
    let mut engine = open(&config, &clock);
    let public = public_key(7);
    engine
        .register_identity(&account(1), &public.serialize(), None)
        .unwrap();

    let sampled = TxFields::build(
        2,
        &[spend(&public_key(8), 8)],
        &[pay(1, 20_000), pay(2, 30_000), pay(3, 40_000)],
        0,
    );
    let (sampled_header, sampled_tree) = mine(std::slice::from_ref(&sampled), T0 - 600, [3u8; 32]);
    let bounty = BountyProof {
        header: sampled_header,
        merkle_proof: sampled_tree.proof(1).unwrap().branch,
        merkle_index: 1,
        tx: sampled,
    };

    let tx = memo_tx(spend(&public, 7), vec![pay(1, 1_000), pay(2, 1_000)]);
    let (header, tree) = mine(std::slice::from_ref(&tx), T0, [4u8; 32]);
    let receipt = engine
        .commit(&proof_for(&header, &tree, 1, &tx), None, Some(&bounty))
        .unwrap();

    let base = base_reward(EASY_BITS, config.native_pay_rate).unwrap();
    assert_eq!(receipt.reward.bounty, base * 4);
    assert_eq!(receipt.claim.amount, base * 4);

    // a recipient the sampled tx never paid is refused
    let tx = memo_tx(spend(&public, 9), vec![pay(1, 1_000), pay(9, 1_000)]);
    let (header, tree) = mine(std::slice::from_ref(&tx), T0, [5u8; 32]);
    assert_eq!(
        engine
            .commit(&proof_for(&header, &tree, 1, &tx), None, Some(&bounty))
            .map(|_| ()),
        Err(PorError::Bounty(Box::new(PorError::UnacceptableRecipient)))
    );
}
