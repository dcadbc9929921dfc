//! Test utilities for proof-of-payment testing

use crate::config::EngineConfig;
use crate::core::engine::{BlockRef, CommitProof, PorEngine};
use crate::core::header::BlockHeader;
use crate::core::merkle::MerkleTree;
use crate::core::reward::PAY_RATE_SCALE;
use crate::core::transaction::{script, TxFields, TxInput, TxOutput};
use crate::core::types::{AccountId, Hash256, PubKeyHash};
use crate::error::{PorError, Result};
use crate::ledger::{CampaignBook, MemoryLedger};
use crate::storage::Store;
use crate::utils::ManualClock;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::ops::{Deref, DerefMut};
use tempfile::TempDir;

/// Timestamp of every test block
pub const T0: u32 = 1_700_000_000;

/// Target just under 2^240: one reward unit per block, ~65k hashes to mine
pub const EASY_BITS: u32 = 0x1f00ffff;

pub type TestPorEngine = PorEngine<MemoryLedger, CampaignBook>;

/// An engine on a temporary store with a clock the test controls
pub struct TestEngine {
    pub engine: TestPorEngine,
    pub clock: ManualClock,
}

impl Deref for TestEngine {
    type Target = TestPorEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl DerefMut for TestEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| PorError::Io(e.to_string()))
}

/// Default settings with a pay rate high enough for visible rewards
pub fn test_config() -> EngineConfig {
    EngineConfig {
        native_pay_rate: 1000 * PAY_RATE_SCALE,
        engine_account: test_account(200),
        treasury: test_account(201),
        ..EngineConfig::default()
    }
}

pub fn test_engine() -> TestEngine {
    let clock = ManualClock::new(u64::from(T0));
    let engine = PorEngine::with_store(
        test_config(),
        Store::temporary().unwrap(),
        MemoryLedger::new(),
        CampaignBook::new(),
        Box::new(clock.clone()),
    )
    .unwrap();
    TestEngine { engine, clock }
}

/// Deterministic secp256k1 key pair
pub fn key_pair(seed: u8) -> (SecretKey, PublicKey) {
    let mut raw = [0u8; 32];
    raw[0] = 1;
    raw[31] = seed;
    let secret = SecretKey::from_slice(&raw).unwrap();
    let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
    (secret, public)
}

/// Distinct non-zero account for each `n`
pub fn test_account(n: u8) -> AccountId {
    let mut id = [n; 20];
    id[0] = 0xac;
    AccountId(id)
}

/// Grind the nonce until the header meets its own target
pub fn mine_header(
    prev_hash: Hash256,
    merkle_root: Hash256,
    timestamp: u32,
    bits: u32,
) -> BlockHeader {
    let mut header = BlockHeader {
        version: 0x2000_0000,
        prev_hash,
        merkle_root,
        timestamp,
        bits,
        nonce: 0,
    };
    while header.verify_work().is_err() {
        header.nonce += 1;
    }
    header
}

/// Input spending `prev_txid:index` with an empty script
pub fn spend_input(prev_txid: Hash256, index: u32) -> TxInput {
    TxInput {
        prev_txid,
        prev_index: index,
        script: Vec::new(),
        sequence: 0xffff_ffff,
    }
}

/// P2PKH spend carrying `public`; `n` varies the spent outpoint
pub fn p2pkh_spend(public: &PublicKey, n: u8) -> TxInput {
    TxInput {
        prev_txid: [n; 32],
        prev_index: 0,
        script: script::p2pkh_sig(&[0x30; 71], &public.serialize()),
        sequence: 0xffff_ffff,
    }
}

/// Memo output followed by a change output
pub fn mining_tx(input: &TxInput, memo: &[u8]) -> TxFields {
    TxFields::build(
        2,
        std::slice::from_ref(input),
        &[
            TxOutput {
                value: 0,
                script: script::op_return(memo),
            },
            TxOutput {
                value: 10_000,
                script: script::p2pkh(&PubKeyHash([0xcc; 20])),
            },
        ],
        0,
    )
}

/// Mine a block holding a coinbase followed by `txs`
pub fn mined_block(txs: &[TxFields], timestamp: u32) -> (Vec<u8>, MerkleTree) {
    let coinbase = TxFields::build(
        1,
        &[spend_input([0u8; 32], u32::MAX)],
        &[TxOutput {
            value: 50 * 100_000_000,
            script: script::p2pkh(&PubKeyHash([0xbb; 20])),
        }],
        0,
    );
    let mut leaves = vec![coinbase.txid()];
    leaves.extend(txs.iter().map(TxFields::txid));
    let tree = MerkleTree::from_leaves(&leaves).unwrap();
    let header = mine_header([0u8; 32], tree.root(), timestamp, EASY_BITS);
    (header.serialize().to_vec(), tree)
}

/// Native-brand commit proof for the tx at `index` of a mined block
pub fn commit_proof(header: &[u8], tree: &MerkleTree, index: u32, tx: &TxFields) -> CommitProof {
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

/// Mine a block around a single mining tx and prove it
pub fn mined_proof(input: &TxInput, memo: &[u8], timestamp: u32) -> CommitProof {
    let tx = mining_tx(input, memo);
    let (header, tree) = mined_block(std::slice::from_ref(&tx), timestamp);
    commit_proof(&header, &tree, 1, &tx)
}
