use crate::core::types::Hash256;
use crate::error::{PorError, Result};
use crate::utils::dsha256;

/// Merkle tree over transaction ids
///
/// Bitcoin-compatible: each level hashes adjacent pairs with double SHA-256,
/// an odd level pairs its last node with itself, and a one-leaf tree's root
/// is the leaf. Every level is kept so branches can be produced for any leaf.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash256>>,
}

/// Inclusion proof in the compact wire form: leaf index plus the sibling
/// hashes from the bottom level upward, concatenated 32 bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub index: u32,
    pub branch: Vec<u8>,
}

/// Hash two nodes together (Bitcoin double SHA-256)
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    dsha256(&combined)
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Hash256]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(PorError::InvalidMerkleProof);
        }

        let mut levels = vec![leaves.to_vec()];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next: Vec<Hash256> = current
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    hash_pair(left, pair.get(1).unwrap_or(left))
                })
                .collect();
            levels.push(next);
        }
        Ok(MerkleTree { levels })
    }

    pub fn root(&self) -> Hash256 {
        // from_leaves never builds an empty tree
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn proof(&self, index: u32) -> Result<MerkleProof> {
        let leaf = index as usize;
        if leaf >= self.leaf_count() {
            return Err(PorError::InvalidMerkleProof);
        }

        let mut branch = Vec::with_capacity(32 * (self.levels.len() - 1));
        let mut position = leaf;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if position % 2 == 1 {
                position - 1
            } else {
                (position + 1).min(level.len() - 1)
            };
            branch.extend_from_slice(&level[sibling]);
            position /= 2;
        }
        Ok(MerkleProof::new(index, branch))
    }
}

impl MerkleProof {
    pub fn new(index: u32, branch: Vec<u8>) -> MerkleProof {
        MerkleProof { index, branch }
    }

    pub fn depth(&self) -> usize {
        self.branch.len() / 32
    }

    /// Fold the branch over `txid` and return the implied root
    pub fn compute_root(&self, txid: &Hash256) -> Result<Hash256> {
        if self.branch.len() % 32 != 0 || self.depth() > 32 {
            return Err(PorError::InvalidMerkleProof);
        }

        let mut current = *txid;
        let mut index = self.index;
        for chunk in self.branch.chunks_exact(32) {
            let mut sibling = [0u8; 32];
            sibling.copy_from_slice(chunk);
            if index & 1 == 1 {
                // a right child never duplicates its left neighbour
                if sibling == current {
                    return Err(PorError::InvalidMerkleProof);
                }
                current = hash_pair(&sibling, &current);
            } else {
                current = hash_pair(&current, &sibling);
            }
            index >>= 1;
        }
        // index bits beyond the branch depth would alias another leaf
        if index != 0 {
            return Err(PorError::InvalidMerkleProof);
        }
        Ok(current)
    }

    pub fn verify(&self, txid: &Hash256, merkle_root: &Hash256) -> Result<()> {
        if self.compute_root(txid)? != *merkle_root {
            return Err(PorError::InvalidMerkleProof);
        }
        Ok(())
    }
}
