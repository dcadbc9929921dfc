//! Error handling for the proof-of-payment engine
//!
//! Every public operation either commits its whole effect or returns one of
//! these variants. The `Display` strings are the reason codes callers match on,
//! so they are kept short and stable.

use std::fmt;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, PorError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PorError {
    // Proof errors
    InsufficientWork,
    InvalidMerkleProof,
    BlockTooOld,
    NoSuchBlock,
    BlockCommitted,
    /// Malformed 80-byte header
    InvalidHeader(String),
    /// Compact target with an exponent outside 4..=32
    InvalidTarget(u32),

    // Format errors
    VinReadOverrun,
    VoutReadOverrun,
    MissingOpReturn,
    MemoLengthOutOfBounds,
    SliceOutOfBounds,
    UnsupportedScript,

    // Economic errors
    BrandNotActive,
    CommitmentMismatch,
    UnregisteredPkh,
    OutpointMismatch,
    PrevTxRequired,
    InvalidPublicKey(String),

    // State machine errors
    Taken,
    TooSoon,
    TooLate,
    Claimed,

    // Identity registry
    AlreadyRegistered,
    NotPkhOwner,
    NotOldOwner,

    // Referral network
    CircularReference,
    ChainTooDeep,
    Noop,
    NoRent,
    NoBalance,
    ZeroAmount,
    NoDuration,
    NoEscalate,
    UpgradeFeeExceedsBalance,
    Cooldown,
    Expired,

    // Bounty proof, wrapping the failing check
    Bounty(Box<PorError>),
    NoRecipient,
    UnacceptableRecipient,
    DustOutput,
    TooManyRecipients,
    DuplicateRecipient,
    SamplingRecipientHasOpRet,

    /// Arithmetic left the representable range
    Overflow(String),
    /// Rejected by the external balance ledger
    Ledger(String),
    Database(String),
    Serialization(String),
    Config(String),
    Io(String),
    Crypto(String),
}

impl PorError {
    /// Tag an error raised while checking the sampled bounty transaction
    pub fn bounty(inner: PorError) -> PorError {
        PorError::Bounty(Box::new(inner))
    }
}

impl fmt::Display for PorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PorError::InsufficientWork => write!(f, "insufficient work"),
            PorError::InvalidMerkleProof => write!(f, "invalid merkle proof"),
            PorError::BlockTooOld => write!(f, "block too old"),
            PorError::NoSuchBlock => write!(f, "no such block"),
            PorError::BlockCommitted => write!(f, "block committed"),
            PorError::InvalidHeader(msg) => write!(f, "invalid header: {msg}"),
            PorError::InvalidTarget(bits) => write!(f, "invalid target bits: {bits:#010x}"),
            PorError::VinReadOverrun => write!(f, "Vin read overrun"),
            PorError::VoutReadOverrun => write!(f, "Vout read overrun"),
            PorError::MissingOpReturn => write!(f, "!OP_RET"),
            PorError::MemoLengthOutOfBounds => write!(f, "OOB: memo length"),
            PorError::SliceOutOfBounds => write!(f, "Slice out of bounds"),
            PorError::UnsupportedScript => write!(f, "unsupported script"),
            PorError::BrandNotActive => write!(f, "brand not active"),
            PorError::CommitmentMismatch => write!(f, "commitment mismatch"),
            PorError::UnregisteredPkh => write!(f, "unregistered PKH"),
            PorError::OutpointMismatch => write!(f, "outpoint mismatch"),
            PorError::PrevTxRequired => write!(f, "previous tx required"),
            PorError::InvalidPublicKey(msg) => write!(f, "invalid public key: {msg}"),
            PorError::Taken => write!(f, "taken"),
            PorError::TooSoon => write!(f, "too soon"),
            PorError::TooLate => write!(f, "too late"),
            PorError::Claimed => write!(f, "claimed"),
            PorError::AlreadyRegistered => write!(f, "registered"),
            PorError::NotPkhOwner => write!(f, "only pkh owner can change the beneficiary"),
            PorError::NotOldOwner => write!(f, "only for old owner"),
            PorError::CircularReference => write!(f, "circular reference"),
            PorError::ChainTooDeep => write!(f, "referral chain too deep"),
            PorError::Noop => write!(f, "noop"),
            PorError::NoRent => write!(f, "!rent"),
            PorError::NoBalance => write!(f, "!balance"),
            PorError::ZeroAmount => write!(f, "!amount"),
            PorError::NoDuration => write!(f, "!duration"),
            PorError::NoEscalate => write!(f, "!escalate"),
            PorError::UpgradeFeeExceedsBalance => write!(f, "balance < upgrade fee"),
            PorError::Cooldown => write!(f, "cooldown"),
            PorError::Expired => write!(f, "expired"),
            PorError::Bounty(inner) => write!(f, "bounty: {inner}"),
            PorError::NoRecipient => write!(f, "no recipient"),
            PorError::UnacceptableRecipient => write!(f, "unacceptable recipient"),
            PorError::DustOutput => write!(f, "dust output"),
            PorError::TooManyRecipients => write!(f, "too many recipients"),
            PorError::DuplicateRecipient => write!(f, "duplicate recipient"),
            PorError::SamplingRecipientHasOpRet => write!(f, "sampling recipient has OP_RET"),
            PorError::Overflow(what) => write!(f, "overflow: {what}"),
            PorError::Ledger(msg) => write!(f, "{msg}"),
            PorError::Database(msg) => write!(f, "Database error: {msg}"),
            PorError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            PorError::Config(msg) => write!(f, "Configuration error: {msg}"),
            PorError::Io(msg) => write!(f, "I/O error: {msg}"),
            PorError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
        }
    }
}

impl std::error::Error for PorError {}

impl From<std::io::Error> for PorError {
    fn from(err: std::io::Error) -> Self {
        PorError::Io(err.to_string())
    }
}

impl From<sled::Error> for PorError {
    fn from(err: sled::Error) -> Self {
        PorError::Database(err.to_string())
    }
}

impl From<sled::transaction::TransactionError> for PorError {
    fn from(err: sled::transaction::TransactionError) -> Self {
        PorError::Database(format!("transaction failed: {err:?}"))
    }
}

impl From<bincode::error::EncodeError> for PorError {
    fn from(err: bincode::error::EncodeError) -> Self {
        PorError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for PorError {
    fn from(err: bincode::error::DecodeError) -> Self {
        PorError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PorError {
    fn from(err: toml::de::Error) -> Self {
        PorError::Config(err.to_string())
    }
}

impl From<secp256k1::Error> for PorError {
    fn from(err: secp256k1::Error) -> Self {
        PorError::InvalidPublicKey(err.to_string())
    }
}
