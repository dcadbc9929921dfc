//! Utility functions and helpers
//!
//! Hashing (SHA-256, double SHA-256, HASH160), base58check rendering,
//! bincode storage encoding and the execution clock.

pub mod crypto;
pub mod serialization;
pub mod time;

pub use crypto::{
    address_to_pkh, base58_decode, base58_encode, dsha256, hash160, pkh_to_address,
    ripemd160_digest, sha256_digest,
};
pub use serialization::{deserialize, serialize};
pub use time::{current_timestamp, Clock, ManualClock, SystemClock};
