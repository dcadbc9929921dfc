// Signals emitted by engine operations, in emission order

use crate::core::types::{AccountId, Amount, ClaimKey, Hash256, PubKeyHash, TokenId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    BlockCommitted {
        block_hash: Hash256,
        timestamp: u32,
    },
    Committed {
        key: ClaimKey,
        txid: Hash256,
        payer: Option<AccountId>,
        amount: Amount,
        /// Id of the weaker transaction this commit displaced
        replaced: Option<Hash256>,
    },
    /// A balance movement; `from: None` is a mint
    Transfer {
        token: Option<TokenId>,
        from: Option<AccountId>,
        to: AccountId,
        amount: Amount,
    },
    Claimed {
        memo_hash: Hash256,
        payer: Option<AccountId>,
        beneficiary: AccountId,
        amount: Amount,
    },
    CommissionPaid {
        miner: AccountId,
        payee: AccountId,
        value: Amount,
    },
    CommissionLost {
        miner: AccountId,
        value: Amount,
    },
    CommissionSkipped {
        miner: AccountId,
    },
    Cutback {
        payee: AccountId,
        miner: AccountId,
        token: Option<TokenId>,
        amount: Amount,
    },
    IdentityRegistered {
        pkh: PubKeyHash,
        owner: AccountId,
        beneficiary: AccountId,
    },
    BeneficiaryChanged {
        pkh: PubKeyHash,
        beneficiary: AccountId,
    },
    Attached {
        node: AccountId,
        parent: AccountId,
    },
    RentUpdated {
        node: AccountId,
        rent: Amount,
        expiration: u64,
    },
}
