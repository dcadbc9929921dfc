//! External collaborators of the engine
//!
//! The engine never holds balances itself. Rewards, commissions and cutbacks
//! are expressed as a batch of [`LedgerOp`]s handed to a [`BalanceLedger`],
//! which must apply all of them or none. Campaign parameters come from a
//! read-only [`CampaignEscrow`].

pub mod escrow;
pub mod memory;

pub use escrow::{Campaign, CampaignBook, CampaignEscrow};
pub use memory::MemoryLedger;

use crate::core::types::{AccountId, Amount, TokenId};
use crate::error::Result;

/// One balance movement. `token: None` is the native reward unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    Mint {
        token: Option<TokenId>,
        to: AccountId,
        amount: Amount,
    },
    Transfer {
        token: Option<TokenId>,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// Move `owner`'s funds on the strength of `spender`'s allowance
    TransferFrom {
        token: Option<TokenId>,
        owner: AccountId,
        spender: AccountId,
        to: AccountId,
        amount: Amount,
    },
}

pub trait BalanceLedger {
    /// Apply the whole batch atomically
    fn apply(&mut self, ops: &[LedgerOp]) -> Result<()>;
}
