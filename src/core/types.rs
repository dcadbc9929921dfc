use crate::error::{PorError, Result};
use crate::utils::{hash160, sha256_digest};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Reward-ledger amount in base units
pub type Amount = u128;

/// 32-byte digest in internal (little-endian) byte order
pub type Hash256 = [u8; 32];

/// Account on the reward ledger (20-byte address)
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 20]);

/// Designated commission tokens are addressed like accounts
pub type TokenId = AccountId;

impl AccountId {
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    /// The account controlled by a secp256k1 key: the last 20 bytes of the
    /// SHA-256 of the uncompressed point without its 0x04 prefix.
    pub fn from_public_key(key: &secp256k1::PublicKey) -> AccountId {
        let uncompressed = key.serialize_uncompressed();
        let digest = sha256_digest(&uncompressed[1..]);
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest[12..]);
        AccountId(id)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", HEXLOWER.encode(&self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

impl FromStr for AccountId {
    type Err = PorError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(raw).map_err(|e| PorError::Config(format!("bad account {s}: {e}")))?;
        let id: [u8; 20] = bytes
            .try_into()
            .map_err(|_| PorError::Config(format!("account must be 20 bytes: {s}")))?;
        Ok(AccountId(id))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// HASH160 of a serialized secp256k1 public key
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct PubKeyHash(pub [u8; 20]);

impl PubKeyHash {
    pub fn from_public_key(serialized: &[u8]) -> PubKeyHash {
        PubKeyHash(hash160(serialized))
    }
}

impl fmt::Display for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

impl fmt::Debug for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKeyHash({self})")
    }
}

impl FromStr for PubKeyHash {
    type Err = PorError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| PorError::Config(format!("bad pkh {s}: {e}")))?;
        let pkh: [u8; 20] = bytes
            .try_into()
            .map_err(|_| PorError::Config(format!("pkh must be 20 bytes: {s}")))?;
        Ok(PubKeyHash(pkh))
    }
}

/// Identifies one reward slot: a source block and the memo brand mined in it
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct ClaimKey {
    pub block_hash: Hash256,
    pub memo_hash: Hash256,
}

impl ClaimKey {
    pub fn new(block_hash: Hash256, memo_hash: Hash256) -> ClaimKey {
        ClaimKey {
            block_hash,
            memo_hash,
        }
    }

    /// Storage key: block hash followed by memo hash
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(&self.block_hash);
        key[32..].copy_from_slice(&self.memo_hash);
        key
    }
}

/// How the mining transaction identifies its miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum MinerKey {
    /// Compressed public key found in the input script
    PublicKey(Vec<u8>),
    /// Key hash read from the redeem script or from the spent output
    PubKeyHash(PubKeyHash),
    /// Spent outpoint; resolved later from the dependency transaction
    Outpoint { txid: Hash256, index: u32 },
}

/// A recorded source-chain block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockCommitment {
    pub block_hash: Hash256,
    pub merkle_root: Hash256,
    pub bits: u32,
    pub timestamp: u32,
}

/// A candidate reward waiting for its claim window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct PendingClaim {
    pub payer: Option<AccountId>,
    pub miner_key: MinerKey,
    pub amount: Amount,
    /// Source block timestamp, checked again at claim time
    pub timestamp: u32,
    /// Mining transaction id; smaller value means stronger work
    pub txid: Hash256,
    pub consumed: bool,
}
