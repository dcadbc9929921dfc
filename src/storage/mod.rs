//! Data storage and persistence
//!
//! Engine tables (committed blocks, pending claims, miner identities and
//! referral nodes) are kept in sled and written atomically per operation.

pub mod store;

pub use store::{Changeset, Store};
