//! Proof-of-work scaled reward calculation
//!
//! A block whose target is exactly `2^240` earns one unit of pay rate. Harder
//! blocks earn proportionally more: `2^240 / target * pay_rate`. Pay rates are
//! fixed-point with 18 decimals, so a rate of `PAY_RATE_SCALE` is 1.0.
//!
//! ## Bounty
//! A mining transaction with `n` qualifying outputs after its memo output earns
//! `2 * n` times the base reward instead. When the sampled bounty block's target
//! is at least twice the mining block's target, the bounty is divided by that
//! integer ratio so an easy sample cannot inflate the payout.
//!
//! ## Memo rules
//! The first `memo_length` bytes of the memo are the brand. A tail of the form
//! `" x<N>"` buys an `N` times reward for `N` times the work; any other tail
//! must be paid for with `2^(8 * tail_len)` work, which makes squatting on
//! look-alike memos exponentially expensive.

use crate::core::target::{bits_to_target, hash_value, max_target};
use crate::core::types::{Amount, Hash256};
use crate::error::{PorError, Result};
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};
use serde::Serialize;

/// Fixed-point scale of pay rates (18 decimals)
pub const PAY_RATE_SCALE: Amount = 1_000_000_000_000_000_000;

/// Pay rate of a campaign that did not set one
pub const DEFAULT_PAY_RATE: Amount = PAY_RATE_SCALE;

/// Retargeting kicks in at this bounty-to-mining target ratio
pub const RETARGET_THRESHOLD: u64 = 2;

/// Largest reward multiplier a memo may request
pub const MAX_MULTIPLIER: u32 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardParams {
    pub bits: u32,
    pub bounty_bits: Option<u32>,
    pub n_bounty: u32,
    pub multiplier: u32,
    pub pay_rate: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub base: Amount,
    pub bounty: Amount,
    /// Divisor applied to the bounty, 1 when no retargeting happened
    pub retarget: u64,
    pub multiplier: u32,
    pub amount: Amount,
}

/// Brand and work requirement parsed out of a memo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoClaim {
    pub brand: Vec<u8>,
    pub multiplier: u32,
    pub required_work: BigUint,
}

impl RewardParams {
    pub fn new(bits: u32, pay_rate: Amount) -> RewardParams {
        RewardParams {
            bits,
            bounty_bits: None,
            n_bounty: 0,
            multiplier: 1,
            pay_rate,
        }
    }
}

fn to_amount(value: BigUint, what: &str) -> Result<Amount> {
    value
        .to_u128()
        .ok_or_else(|| PorError::Overflow(what.to_string()))
}

/// `2^240 / target(bits) * pay_rate`
pub fn base_reward(bits: u32, pay_rate: Amount) -> Result<Amount> {
    let target = bits_to_target(bits)?;
    let units = max_target() / target;
    to_amount(
        units * BigUint::from(pay_rate) / BigUint::from(PAY_RATE_SCALE),
        "base reward",
    )
}

pub fn compute_reward(params: &RewardParams) -> Result<Reward> {
    let base = base_reward(params.bits, params.pay_rate)?;

    let mut bounty = 0;
    let mut retarget = 1;
    if params.n_bounty > 0 {
        bounty = base
            .checked_mul(2 * params.n_bounty as Amount)
            .ok_or_else(|| PorError::Overflow("bounty reward".to_string()))?;
        if let Some(bounty_bits) = params.bounty_bits {
            let ratio = bits_to_target(bounty_bits)? / bits_to_target(params.bits)?;
            let ratio = ratio.to_u64().unwrap_or(u64::MAX);
            if ratio >= RETARGET_THRESHOLD {
                retarget = ratio;
                bounty /= ratio as Amount;
            }
        }
    }

    let earned = if params.n_bounty > 0 { bounty } else { base };
    let amount = earned
        .checked_mul(params.multiplier.max(1) as Amount)
        .ok_or_else(|| PorError::Overflow("reward multiplier".to_string()))?;

    Ok(Reward {
        base,
        bounty,
        retarget,
        multiplier: params.multiplier.max(1),
        amount,
    })
}

/// Split a memo into brand and tail and price the tail in work
pub fn parse_memo(memo: &[u8], memo_length: usize, max_memo_length: usize) -> Result<MemoClaim> {
    if memo.len() > max_memo_length || memo_length > memo.len() {
        return Err(PorError::MemoLengthOutOfBounds);
    }
    let brand_len = if memo_length == 0 {
        memo.len()
    } else {
        memo_length
    };
    let (brand, tail) = memo.split_at(brand_len);

    let (multiplier, required_work) = if tail.is_empty() {
        (1, BigUint::one())
    } else if let Some(n) = parse_multiplier(tail) {
        (n, BigUint::from(n))
    } else {
        (1, BigUint::one() << (8 * tail.len()))
    };

    Ok(MemoClaim {
        brand: brand.to_vec(),
        multiplier,
        required_work,
    })
}

/// `" x<N>"` with a canonical decimal `N` in `2..=MAX_MULTIPLIER`
fn parse_multiplier(tail: &[u8]) -> Option<u32> {
    let digits = tail.strip_prefix(b" x")?;
    if digits.is_empty() || digits[0] == b'0' || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let n: u32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    (2..=MAX_MULTIPLIER).contains(&n).then_some(n)
}

/// The txid read as a number must be at most `(2^256 - 1) / required_work`
pub fn check_work(txid: &Hash256, required_work: &BigUint) -> Result<()> {
    if required_work.bits() > 256 {
        return Err(PorError::InsufficientWork);
    }
    let ceiling = ((BigUint::one() << 256usize) - 1u8) / required_work;
    if hash_value(txid) > ceiling {
        return Err(PorError::InsufficientWork);
    }
    Ok(())
}
