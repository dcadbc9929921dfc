//! # por-bridge - Proof-of-Payment Rewards for Source-Chain Miners
//!
//! This crate pays people for work they already did on another chain. A
//! miner embeds a brand in an OP_RETURN memo, mines the transaction into a
//! block, and brings me the header, the merkle branch and the transaction
//! fields. I check all of it without trusting anyone and, once the claim
//! window opens, pay the reward to whoever the miner registered.
//!
//! ## What Is In Here
//! - **Header & Merkle Verifier**: 80-byte headers, compact targets, Bitcoin merkle branches
//! - **Transaction Codec**: vin/vout parsing, memo extraction, miner key discovery
//! - **Identity Registry**: binds a miner's key hash to a beneficiary account
//! - **Reward & Bounty**: work-proportional rewards, bounty proofs with retargeting
//! - **Commit/Claim Engine**: competitive commits, exactly-once claims
//! - **Referral Network**: rent-funded sponsor tree that collects commissions
//!
//! ## How The Code Is Organized
//! - `core/`: parsing, verification, reward math, registry, referral tree, engine
//! - `ledger/`: the balance ledger and campaign escrow the engine talks to
//! - `storage/`: the sled store every state change is committed to
//! - `config/`: TOML settings with `POR_*` environment overrides
//! - `utils/`: hashing, bincode helpers and the execution clock
//! - `cli/`: the `por-bridge` binary's subcommands
//!
//! ## Things To Keep In Mind
//! - Every operation either commits its whole effect or returns an error;
//!   nothing is written until the full next state has been computed.
//! - Time never advances on its own. Windows and rent decay are evaluated
//!   against the clock at call time.
//! - Amounts are `u128` and every multiplication that can overflow is checked.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{execute, Command, Opt};
pub use config::{Config, EngineConfig, GLOBAL_CONFIG};
pub use core::{
    AccountId, Amount, BlockRef, ClaimKey, ClaimRequest, CommitProof, Event, Hash256, MinerKey,
    PendingClaim, PorEngine, PubKeyHash, TxFields,
};
pub use error::{PorError, Result};
pub use ledger::{BalanceLedger, CampaignBook, CampaignEscrow, LedgerOp, MemoryLedger};
pub use storage::{Changeset, Store};
pub use utils::{current_timestamp, sha256_digest, Clock, ManualClock, SystemClock};
