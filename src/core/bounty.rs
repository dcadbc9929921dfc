// Bounty proof: a second, sampled transaction that vouches for the extra
// outputs of the mining transaction
//
// The outputs between the memo output and the final change output are the
// bounty recipients. Each must pay a script the sampled transaction also
// pays, the sampled transaction must be proven in a block mined shortly
// before or after the mining block, and it must not carry a memo itself.

use crate::core::header::BlockHeader;
use crate::core::transaction::{TxFields, TxOutput};
use crate::error::{PorError, Result};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BountyProof {
    pub header: Vec<u8>,
    pub merkle_proof: Vec<u8>,
    pub merkle_index: u32,
    pub tx: TxFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BountyLimits {
    pub window_secs: u64,
    pub max_recipients: u32,
    pub dust_threshold: u64,
}

/// What a valid bounty proof contributes to the reward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BountyCheck {
    pub n_bounty: u32,
    pub bits: u32,
}

/// Number of recipient outputs: everything after the memo but the change
pub fn count_bounty(outputs: usize, memo_index: usize) -> usize {
    outputs.saturating_sub(memo_index + 2)
}

/// Validate `proof` against the mining transaction's outputs.
/// Every failure comes back tagged as a bounty error.
pub fn verify_bounty(
    proof: &BountyProof,
    mining_outputs: &[TxOutput],
    memo_index: usize,
    mining_timestamp: u32,
    limits: &BountyLimits,
) -> Result<BountyCheck> {
    check(proof, mining_outputs, memo_index, mining_timestamp, limits).map_err(PorError::bounty)
}

fn check(
    proof: &BountyProof,
    mining_outputs: &[TxOutput],
    memo_index: usize,
    mining_timestamp: u32,
    limits: &BountyLimits,
) -> Result<BountyCheck> {
    let header = BlockHeader::parse(&proof.header)?;
    header.verify_work()?;
    header.verify_inclusion(&proof.tx.txid(), proof.merkle_index, &proof.merkle_proof)?;

    if u64::from(header.timestamp) + limits.window_secs < u64::from(mining_timestamp) {
        return Err(PorError::BlockTooOld);
    }

    let sampled = proof.tx.outputs()?;
    if sampled.iter().any(TxOutput::is_op_return) {
        return Err(PorError::SamplingRecipientHasOpRet);
    }

    let n_bounty = count_bounty(mining_outputs.len(), memo_index);
    if n_bounty == 0 {
        return Err(PorError::NoRecipient);
    }
    if n_bounty > limits.max_recipients as usize || n_bounty > sampled.len() {
        return Err(PorError::TooManyRecipients);
    }

    let accepted: HashSet<&[u8]> = sampled.iter().map(|o| o.script.as_slice()).collect();
    let mut seen = HashSet::new();
    for output in &mining_outputs[memo_index + 1..memo_index + 1 + n_bounty] {
        if output.value < limits.dust_threshold {
            return Err(PorError::DustOutput);
        }
        if !accepted.contains(output.script.as_slice()) {
            return Err(PorError::UnacceptableRecipient);
        }
        if !seen.insert(output.script.as_slice()) {
            return Err(PorError::DuplicateRecipient);
        }
    }

    Ok(BountyCheck {
        n_bounty: n_bounty as u32,
        bits: header.bits,
    })
}
