// Sled-backed engine state
//
// One tree per entity table. Values are bincode encodings of the entity
// structs; keys are the raw identifiers. Writes only ever happen through
// `commit`, which applies a whole Changeset in one multi-tree transaction.

use crate::core::identity::MinerIdentity;
use crate::core::referral::NodeRecord;
use crate::core::types::{AccountId, BlockCommitment, ClaimKey, PendingClaim, PubKeyHash};
use crate::error::{PorError, Result};
use crate::utils::{deserialize, serialize};
use log::debug;
use sled::transaction::TransactionError;
use sled::{Db, Transactional, Tree};
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";
const CLAIMS_TREE: &str = "claims";
const MINERS_TREE: &str = "miners";
const NODES_TREE: &str = "nodes";

type Entry = (Vec<u8>, Vec<u8>);

/// Encoded writes for every tree, staged before anything touches disk
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    blocks: Vec<Entry>,
    claims: Vec<Entry>,
    miners: Vec<Entry>,
    nodes: Vec<Entry>,
    removed_nodes: Vec<Vec<u8>>,
}

impl Changeset {
    pub fn new() -> Changeset {
        Changeset::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.claims.is_empty()
            && self.miners.is_empty()
            && self.nodes.is_empty()
            && self.removed_nodes.is_empty()
    }

    pub fn put_block(&mut self, block: &BlockCommitment) -> Result<()> {
        self.blocks
            .push((block.block_hash.to_vec(), serialize(block)?));
        Ok(())
    }

    pub fn put_claim(&mut self, key: &ClaimKey, claim: &PendingClaim) -> Result<()> {
        self.claims.push((key.to_bytes().to_vec(), serialize(claim)?));
        Ok(())
    }

    pub fn put_miner(&mut self, pkh: &PubKeyHash, identity: &MinerIdentity) -> Result<()> {
        self.miners.push((pkh.0.to_vec(), serialize(identity)?));
        Ok(())
    }

    pub fn put_node(&mut self, record: &NodeRecord) -> Result<()> {
        self.nodes
            .push((record.account.0.to_vec(), serialize(record)?));
        Ok(())
    }

    pub fn remove_node(&mut self, account: &AccountId) {
        self.removed_nodes.push(account.0.to_vec());
    }
}

pub struct Store {
    db: Db,
    blocks: Tree,
    claims: Tree,
    miners: Tree,
    nodes: Tree,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        let db = sled::open(path.as_ref())
            .map_err(|e| PorError::Database(format!("Failed to open database: {e}")))?;
        Store::with_db(db)
    }

    /// A store that lives only as long as the process
    pub fn temporary() -> Result<Store> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| PorError::Database(format!("Failed to open temporary database: {e}")))?;
        Store::with_db(db)
    }

    fn with_db(db: Db) -> Result<Store> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| PorError::Database(format!("Failed to open {name} tree: {e}")))
        };
        Ok(Store {
            blocks: open(BLOCKS_TREE)?,
            claims: open(CLAIMS_TREE)?,
            miners: open(MINERS_TREE)?,
            nodes: open(NODES_TREE)?,
            db,
        })
    }

    pub fn commit(&self, changes: &Changeset) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        (&self.blocks, &self.claims, &self.miners, &self.nodes)
            .transaction(|(blocks, claims, miners, nodes)| {
                for (key, value) in &changes.blocks {
                    blocks.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &changes.claims {
                    claims.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &changes.miners {
                    miners.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &changes.nodes {
                    nodes.insert(key.as_slice(), value.as_slice())?;
                }
                for key in &changes.removed_nodes {
                    nodes.remove(key.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e: TransactionError| {
                PorError::Database(format!("Failed to commit changeset: {e:?}"))
            })?;
        debug!(
            "Committed {} block, {} claim, {} miner, {} node records, removed {} nodes",
            changes.blocks.len(),
            changes.claims.len(),
            changes.miners.len(),
            changes.nodes.len(),
            changes.removed_nodes.len()
        );
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn load_blocks(&self) -> Result<Vec<BlockCommitment>> {
        self.blocks
            .iter()
            .map(|item| {
                let (_, value) = item?;
                deserialize(&value)
            })
            .collect()
    }

    pub fn load_claims(&self) -> Result<Vec<(ClaimKey, PendingClaim)>> {
        self.claims
            .iter()
            .map(|item| {
                let (key, value) = item?;
                let key: [u8; 64] = key.as_ref().try_into().map_err(|_| {
                    PorError::Database(format!("claim key has {} bytes", key.len()))
                })?;
                let mut block_hash = [0u8; 32];
                let mut memo_hash = [0u8; 32];
                block_hash.copy_from_slice(&key[..32]);
                memo_hash.copy_from_slice(&key[32..]);
                Ok((ClaimKey::new(block_hash, memo_hash), deserialize(&value)?))
            })
            .collect()
    }

    pub fn load_miners(&self) -> Result<Vec<(PubKeyHash, MinerIdentity)>> {
        self.miners
            .iter()
            .map(|item| {
                let (key, value) = item?;
                let pkh: [u8; 20] = key.as_ref().try_into().map_err(|_| {
                    PorError::Database(format!("miner key has {} bytes", key.len()))
                })?;
                Ok((PubKeyHash(pkh), deserialize(&value)?))
            })
            .collect()
    }

    pub fn load_nodes(&self) -> Result<Vec<NodeRecord>> {
        self.nodes
            .iter()
            .map(|item| {
                let (_, value) = item?;
                deserialize(&value)
            })
            .collect()
    }

    pub fn node(&self, account: &AccountId) -> Result<Option<NodeRecord>> {
        self.nodes
            .get(account.0)?
            .map(|value| deserialize(&value))
            .transpose()
    }
}
