//! Core proof-of-payment functionality
//!
//! Source-chain parsing (headers, merkle branches, transaction fields), the
//! reward and bounty arithmetic, the miner identity registry, the referral
//! network and the commit/claim engine that ties them together.

pub mod bounty;
pub mod engine;
pub mod events;
pub mod header;
pub mod identity;
pub mod merkle;
pub mod referral;
pub mod reward;
pub mod target;
pub mod transaction;
pub mod types;

pub use bounty::{verify_bounty, BountyCheck, BountyLimits, BountyProof};
pub use engine::{
    memo_hash, BlockRef, ClaimRequest, CommitProof, CommitReceipt, DependencyTx, PorEngine,
};
pub use events::Event;
pub use header::{display_hash, BlockHeader, HEADER_LEN};
pub use identity::{MinerIdentity, MinerRegistry};
pub use merkle::{MerkleProof, MerkleTree};
pub use referral::{
    CommissionPolicy, CommissionRoute, Cutback, NodeInfo, RefNetwork, RentUpdate, RATE_SCALE,
};
pub use reward::{compute_reward, Reward, RewardParams, PAY_RATE_SCALE};
pub use target::{bits_to_target, target_to_bits};
pub use transaction::{TxFields, TxInput, TxOutput};
pub use types::{
    AccountId, Amount, BlockCommitment, ClaimKey, Hash256, MinerKey, PendingClaim, PubKeyHash,
    TokenId,
};
