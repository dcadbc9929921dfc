use crate::core::merkle::MerkleProof;
use crate::core::target::{bits_to_target, hash_value};
use crate::core::types::Hash256;
use crate::error::{PorError, Result};
use crate::utils::dsha256;
use data_encoding::HEXLOWER;
use num_bigint::BigUint;

pub const HEADER_LEN: usize = 80;

/// An 80-byte source-chain block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256, // internal byte order, as serialized
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn parse(bytes: &[u8]) -> Result<BlockHeader> {
        if bytes.len() != HEADER_LEN {
            return Err(PorError::InvalidHeader(format!(
                "expected {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        Ok(BlockHeader {
            version: word(0),
            prev_hash,
            merkle_root,
            timestamp: word(68),
            bits: word(72),
            nonce: word(76),
        })
    }

    pub fn serialize(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn hash(&self) -> Hash256 {
        dsha256(&self.serialize())
    }

    pub fn target(&self) -> Result<BigUint> {
        bits_to_target(self.bits)
    }

    /// Check the header hash against its own target; returns the block hash
    pub fn verify_work(&self) -> Result<Hash256> {
        let hash = self.hash();
        if hash_value(&hash) > self.target()? {
            return Err(PorError::InsufficientWork);
        }
        Ok(hash)
    }

    /// Check that `txid` sits at `index` under this header's merkle root
    pub fn verify_inclusion(&self, txid: &Hash256, index: u32, branch: &[u8]) -> Result<()> {
        MerkleProof::new(index, branch.to_vec()).verify(txid, &self.merkle_root)
    }
}

/// Hex in the reversed byte order block explorers show
pub fn display_hash(hash: &Hash256) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    HEXLOWER.encode(&reversed)
}

/// Parse an explorer-order hex hash into internal byte order
pub fn parse_display_hash(hex_hash: &str) -> Result<Hash256> {
    let bytes = hex::decode(hex_hash)
        .map_err(|e| PorError::InvalidHeader(format!("bad hash {hex_hash}: {e}")))?;
    let mut hash: Hash256 = bytes
        .try_into()
        .map_err(|_| PorError::InvalidHeader(format!("hash must be 32 bytes: {hex_hash}")))?;
    hash.reverse();
    Ok(hash)
}
