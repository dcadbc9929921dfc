use crate::core::types::{AccountId, Amount, TokenId};
use crate::error::{PorError, Result};
use crate::ledger::{BalanceLedger, LedgerOp};
use std::collections::HashMap;

type Holder = (Option<TokenId>, AccountId);

/// In-memory multi-token ledger with ERC-20 style allowances
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    balances: HashMap<Holder, Amount>,
    allowances: HashMap<(Option<TokenId>, AccountId, AccountId), Amount>,
}

impl MemoryLedger {
    pub fn new() -> MemoryLedger {
        MemoryLedger::default()
    }

    pub fn balance_of(&self, token: Option<TokenId>, account: &AccountId) -> Amount {
        self.balances
            .get(&(token, *account))
            .copied()
            .unwrap_or(0)
    }

    pub fn allowance(
        &self,
        token: Option<TokenId>,
        owner: &AccountId,
        spender: &AccountId,
    ) -> Amount {
        self.allowances
            .get(&(token, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn approve(
        &mut self,
        token: Option<TokenId>,
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    ) {
        self.allowances.insert((token, owner, spender), amount);
    }

    /// Credit an account directly, outside of any batch
    pub fn fund(&mut self, token: Option<TokenId>, to: AccountId, amount: Amount) -> Result<()> {
        self.credit(token, to, amount)
    }

    fn credit(&mut self, token: Option<TokenId>, to: AccountId, amount: Amount) -> Result<()> {
        let balance = self.balances.entry((token, to)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| PorError::Overflow("ledger balance".to_string()))?;
        Ok(())
    }

    fn debit(&mut self, token: Option<TokenId>, from: AccountId, amount: Amount) -> Result<()> {
        let balance = self.balances.entry((token, from)).or_insert(0);
        if *balance < amount {
            return Err(PorError::Ledger(
                "transfer amount exceeds balance".to_string(),
            ));
        }
        *balance -= amount;
        Ok(())
    }

    fn apply_one(&mut self, op: &LedgerOp) -> Result<()> {
        match op {
            LedgerOp::Mint { token, to, amount } => self.credit(*token, *to, *amount),
            LedgerOp::Transfer {
                token,
                from,
                to,
                amount,
            } => {
                self.debit(*token, *from, *amount)?;
                self.credit(*token, *to, *amount)
            }
            LedgerOp::TransferFrom {
                token,
                owner,
                spender,
                to,
                amount,
            } => {
                let allowance = self.allowances.entry((*token, *owner, *spender)).or_insert(0);
                if *allowance < *amount {
                    return Err(PorError::Ledger(
                        "transfer amount exceeds allowance".to_string(),
                    ));
                }
                *allowance -= amount;
                self.debit(*token, *owner, *amount)?;
                self.credit(*token, *to, *amount)
            }
        }
    }
}

impl BalanceLedger for MemoryLedger {
    fn apply(&mut self, ops: &[LedgerOp]) -> Result<()> {
        let mut next = self.clone();
        for op in ops {
            next.apply_one(op)?;
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_account;

    #[test]
    fn test_mint_and_transfer() {
        let mut ledger = MemoryLedger::new();
        let [a, b] = [test_account(1), test_account(2)];
        ledger
            .apply(&[
                LedgerOp::Mint {
                    token: None,
                    to: a,
                    amount: 100,
                },
                LedgerOp::Transfer {
                    token: None,
                    from: a,
                    to: b,
                    amount: 30,
                },
            ])
            .unwrap();
        assert_eq!(ledger.balance_of(None, &a), 70);
        assert_eq!(ledger.balance_of(None, &b), 30);
    }

    #[test]
    fn test_failed_batch_changes_nothing() {
        let mut ledger = MemoryLedger::new();
        let [a, b] = [test_account(1), test_account(2)];
        let result = ledger.apply(&[
            LedgerOp::Mint {
                token: None,
                to: a,
                amount: 10,
            },
            LedgerOp::Transfer {
                token: None,
                from: a,
                to: b,
                amount: 11,
            },
        ]);
        assert_eq!(
            result,
            Err(PorError::Ledger("transfer amount exceeds balance".to_string()))
        );
        assert_eq!(ledger.balance_of(None, &a), 0);
    }

    #[test]
    fn test_transfer_from_needs_allowance() {
        let mut ledger = MemoryLedger::new();
        let [owner, spender, to, token] =
            [test_account(1), test_account(2), test_account(3), test_account(4)];
        ledger.fund(Some(token), owner, 50).unwrap();
        let op = LedgerOp::TransferFrom {
            token: Some(token),
            owner,
            spender,
            to,
            amount: 20,
        };
        assert_eq!(
            ledger.apply(&[op.clone()]),
            Err(PorError::Ledger("transfer amount exceeds allowance".to_string()))
        );

        ledger.approve(Some(token), owner, spender, 25);
        ledger.apply(&[op]).unwrap();
        assert_eq!(ledger.balance_of(Some(token), &to), 20);
        assert_eq!(ledger.balance_of(Some(token), &owner), 30);
        assert_eq!(ledger.allowance(Some(token), &owner, &spender), 5);
        // native balances are separate
        assert_eq!(ledger.balance_of(None, &to), 0);
    }
}
