use ring::digest::{Context, SHA256};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{PorError, Result};

/// Version byte of a mainnet pay-to-key-hash address
const P2PKH_VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Bitcoin's double SHA-256, used for header hashes, txids and merkle nodes
pub fn dsha256(data: &[u8]) -> [u8; 32] {
    sha256_digest(&sha256_digest(data))
}

pub fn ripemd160_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// RIPEMD160(SHA256(data)), the public-key-hash of a serialized key
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160_digest(&sha256_digest(data))
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| PorError::Crypto(format!("Invalid base58 encoding: {e}")))
}

/// Render a public-key-hash as a legacy base58check address
pub fn pkh_to_address(pkh: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(1 + 20 + ADDRESS_CHECK_SUM_LEN);
    payload.push(P2PKH_VERSION);
    payload.extend_from_slice(pkh);
    let checksum = dsha256(&payload);
    payload.extend_from_slice(&checksum[..ADDRESS_CHECK_SUM_LEN]);
    base58_encode(&payload)
}

/// Parse a legacy base58check address back into its public-key-hash
pub fn address_to_pkh(address: &str) -> Result<[u8; 20]> {
    let payload = base58_decode(address)?;
    if payload.len() != 1 + 20 + ADDRESS_CHECK_SUM_LEN || payload[0] != P2PKH_VERSION {
        return Err(PorError::Crypto(format!("Not a P2PKH address: {address}")));
    }
    let (body, checksum) = payload.split_at(1 + 20);
    if dsha256(body)[..ADDRESS_CHECK_SUM_LEN] != *checksum {
        return Err(PorError::Crypto(format!("Bad address checksum: {address}")));
    }
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(&body[1..]);
    Ok(pkh)
}
