// Compact difficulty ("bits") handling for source-chain headers
//
// A compact value is an 8-bit exponent over a 23-bit mantissa. The 256-bit
// target is the mantissa shifted left by 8 and written big-endian at byte
// offset `32 - exponent` of a 32-byte buffer.

use crate::core::types::Hash256;
use crate::error::{PorError, Result};
use num_bigint::BigUint;
use num_traits::Zero;

/// log2 of the reference target that a reward of one full unit is paid for
pub const MAX_TARGET_BITS: u32 = 240;

const MANTISSA_MASK: u32 = 0x007f_ffff;
const MIN_EXPONENT: u32 = 4;
const MAX_EXPONENT: u32 = 32;

/// 2^240
pub fn max_target() -> BigUint {
    BigUint::from(1u8) << MAX_TARGET_BITS
}

/// Expand compact bits into the big-endian 32-byte target
pub fn bits_to_target_bytes(bits: u32) -> Result<[u8; 32]> {
    let exponent = bits >> 24;
    let mantissa = bits & MANTISSA_MASK;
    if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) || mantissa == 0 {
        return Err(PorError::InvalidTarget(bits));
    }

    let mut target = [0u8; 32];
    let offset = (32 - exponent) as usize;
    target[offset..offset + 4].copy_from_slice(&(mantissa << 8).to_be_bytes());
    Ok(target)
}

pub fn bits_to_target(bits: u32) -> Result<BigUint> {
    Ok(BigUint::from_bytes_be(&bits_to_target_bytes(bits)?))
}

/// Re-encode a target in normalized compact form
pub fn target_to_bits(target: &BigUint) -> Result<u32> {
    if target.is_zero() {
        return Err(PorError::InvalidTarget(0));
    }
    let bytes = target.to_bytes_be();
    let mut size = bytes.len() as u32;
    let mut compact = if bytes.len() <= 3 {
        let mut word = [0u8; 4];
        word[4 - bytes.len()..].copy_from_slice(&bytes);
        u32::from_be_bytes(word) << (8 * (3 - size))
    } else {
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    };
    // keep the sign bit clear
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    let bits = compact | (size << 24);
    if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&size) {
        return Err(PorError::InvalidTarget(bits));
    }
    Ok(bits)
}

/// Numeric value of a double-SHA digest, read little-endian as Bitcoin does
pub fn hash_value(hash: &Hash256) -> BigUint {
    BigUint::from_bytes_le(hash)
}
