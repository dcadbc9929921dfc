// Raw transaction field codec
//
// A mining proof carries the transaction split into its four fields:
// version and locktime as integers, vin and vout as the raw byte ranges
// (including their leading count varints, witness data stripped). Reads
// never trust declared lengths or caller offsets; every slice is bounds
// checked and reported with the field-specific error.

use crate::core::types::{Hash256, MinerKey, PubKeyHash};
use crate::error::{PorError, Result};
use crate::utils::dsha256;

pub const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const COMPRESSED_KEY_LEN: usize = 33;

/// The four serialized fields of a source-chain transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFields {
    pub version: u32,
    pub vin: Vec<u8>,  // input count varint followed by the inputs
    pub vout: Vec<u8>, // output count varint followed by the outputs
    pub locktime: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_txid: Hash256,
    pub prev_index: u32,
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

/// The payload of the transaction's null-data output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memo {
    pub output_index: usize,
    pub payload: Vec<u8>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    overrun: PorError,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], overrun: PorError) -> Self {
        Reader {
            bytes,
            pos: 0,
            overrun,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.overrun.clone())?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(word))
    }

    fn read_varint(&mut self) -> Result<u64> {
        let prefix = self.take(1)?[0];
        Ok(match prefix {
            0xfd => {
                let raw = self.take(2)?;
                u16::from_le_bytes([raw[0], raw[1]]) as u64
            }
            0xfe => self.read_u32()? as u64,
            0xff => self.read_u64()?,
            n => n as u64,
        })
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_varint()?;
        usize::try_from(len).map_err(|_| self.overrun.clone())
    }

    fn read_hash(&mut self) -> Result<Hash256> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(self.take(32)?);
        Ok(hash)
    }
}

/// Append a CompactSize integer
pub fn write_varint(n: u64, out: &mut Vec<u8>) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

impl TxInput {
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.prev_txid);
        out.extend_from_slice(&self.prev_index.to_le_bytes());
        write_varint(self.script.len() as u64, out);
        out.extend_from_slice(&self.script);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

impl TxOutput {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + self.script.len());
        out.extend_from_slice(&self.value.to_le_bytes());
        write_varint(self.script.len() as u64, &mut out);
        out.extend_from_slice(&self.script);
        out
    }

    pub fn is_op_return(&self) -> bool {
        self.script.first() == Some(&OP_RETURN)
    }
}

impl TxFields {
    pub fn new(version: u32, vin: Vec<u8>, vout: Vec<u8>, locktime: u32) -> TxFields {
        TxFields {
            version,
            vin,
            vout,
            locktime,
        }
    }

    /// Assemble the fields from decoded inputs and outputs
    pub fn build(
        version: u32,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        locktime: u32,
    ) -> TxFields {
        let mut vin = Vec::new();
        write_varint(inputs.len() as u64, &mut vin);
        for input in inputs {
            input.serialize(&mut vin);
        }
        let mut vout = Vec::new();
        write_varint(outputs.len() as u64, &mut vout);
        for output in outputs {
            vout.extend_from_slice(&output.serialize());
        }
        TxFields::new(version, vin, vout, locktime)
    }

    /// Witness-free transaction id
    pub fn txid(&self) -> Hash256 {
        let mut raw = Vec::with_capacity(8 + self.vin.len() + self.vout.len());
        raw.extend_from_slice(&self.version.to_le_bytes());
        raw.extend_from_slice(&self.vin);
        raw.extend_from_slice(&self.vout);
        raw.extend_from_slice(&self.locktime.to_le_bytes());
        dsha256(&raw)
    }

    pub fn input_count(&self) -> Result<u64> {
        Reader::new(&self.vin, PorError::VinReadOverrun).read_varint()
    }

    /// Skip to the `index`-th input and decode it
    pub fn input(&self, index: u32) -> Result<TxInput> {
        let mut reader = Reader::new(&self.vin, PorError::VinReadOverrun);
        let count = reader.read_varint()?;
        if u64::from(index) >= count {
            return Err(PorError::VinReadOverrun);
        }
        for _ in 0..index {
            reader.take(36)?;
            let script_len = reader.read_len()?;
            reader.take(script_len)?;
            reader.take(4)?;
        }
        let prev_txid = reader.read_hash()?;
        let prev_index = reader.read_u32()?;
        let script_len = reader.read_len()?;
        let script = reader.take(script_len)?.to_vec();
        let sequence = reader.read_u32()?;
        Ok(TxInput {
            prev_txid,
            prev_index,
            script,
            sequence,
        })
    }

    pub fn outputs(&self) -> Result<Vec<TxOutput>> {
        let mut reader = Reader::new(&self.vout, PorError::VoutReadOverrun);
        let count = reader.read_varint()?;
        let mut outputs = Vec::new();
        for _ in 0..count {
            let value = reader.read_u64()?;
            let script_len = reader.read_len()?;
            let script = reader.take(script_len)?.to_vec();
            outputs.push(TxOutput { value, script });
        }
        Ok(outputs)
    }

    /// Locate the OP_RETURN output and read its payload
    pub fn memo(&self) -> Result<Memo> {
        let outputs = self.outputs()?;
        let (output_index, output) = outputs
            .iter()
            .enumerate()
            .find(|(_, output)| output.is_op_return())
            .ok_or(PorError::MissingOpReturn)?;
        Ok(Memo {
            output_index,
            payload: op_return_payload(&output.script)?,
        })
    }
}

/// Data pushed after OP_RETURN; a bare OP_RETURN carries an empty memo
pub fn op_return_payload(script: &[u8]) -> Result<Vec<u8>> {
    if script.first() != Some(&OP_RETURN) {
        return Err(PorError::MissingOpReturn);
    }
    let mut reader = Reader::new(&script[1..], PorError::SliceOutOfBounds);
    let opcode = match reader.take(1) {
        Ok(op) => op[0],
        Err(_) => return Ok(Vec::new()),
    };
    let len = match opcode {
        1..=75 => opcode as usize,
        OP_PUSHDATA1 => reader.take(1)?[0] as usize,
        OP_PUSHDATA2 => {
            let raw = reader.take(2)?;
            u16::from_le_bytes([raw[0], raw[1]]) as usize
        }
        _ => return Err(PorError::UnsupportedScript),
    };
    Ok(reader.take(len)?.to_vec())
}

/// Find the miner's key in an input script.
///
/// A non-zero `pubkey_pos` is the caller's claim that a compressed key starts
/// there; the bytes found must be a valid compressed secp256k1 point. Zero
/// asks for detection of the two shapes that carry the key inline: a
/// P2SH-wrapped P2WPKH redeem script (yields the key hash) and a P2PKH
/// signature script (yields the key). `None` means the key lives in the spent
/// output and must come from the dependency transaction.
pub fn key_in_input(script: &[u8], pubkey_pos: usize) -> Result<Option<MinerKey>> {
    if pubkey_pos > 0 {
        let key = pubkey_pos
            .checked_add(COMPRESSED_KEY_LEN)
            .and_then(|end| script.get(pubkey_pos..end))
            .ok_or(PorError::SliceOutOfBounds)?;
        return compressed_key(key).map(Some);
    }

    // 0x16 <0x00 0x14 <20-byte pkh>>
    if script.len() == 23 && script[..3] == [0x16, 0x00, 0x14] {
        let mut pkh = [0u8; 20];
        pkh.copy_from_slice(&script[3..]);
        return Ok(Some(MinerKey::PubKeyHash(PubKeyHash(pkh))));
    }

    // <sig push> 0x21 <33-byte key>
    if let Some(&sig_len) = script.first() {
        let at = sig_len as usize + 1;
        if script.get(at) == Some(&(COMPRESSED_KEY_LEN as u8))
            && script.len() == at + 1 + COMPRESSED_KEY_LEN
            && matches!(script[at + 1], 0x02 | 0x03)
        {
            return compressed_key(&script[at + 1..]).map(Some);
        }
    }
    Ok(None)
}

fn compressed_key(bytes: &[u8]) -> Result<MinerKey> {
    match bytes.first() {
        Some(0x02 | 0x03) => {}
        Some(prefix) => {
            return Err(PorError::InvalidPublicKey(format!(
                "prefix {prefix:#04x} is not a compressed key"
            )))
        }
        None => return Err(PorError::SliceOutOfBounds),
    }
    secp256k1::PublicKey::from_slice(bytes)?;
    Ok(MinerKey::PublicKey(bytes.to_vec()))
}

/// Read a key hash from a serialized output (value, script length, script).
/// `pkh_pos == 0` detects P2PKH and P2WPKH outputs.
pub fn pkh_in_output(output: &TxOutput, pkh_pos: usize) -> Result<PubKeyHash> {
    let position = if pkh_pos > 0 {
        pkh_pos
    } else {
        let script = &output.script;
        if script.len() == 25
            && script[..3] == [0x76, 0xa9, 0x14]
            && script[23..] == [0x88, 0xac]
        {
            12
        } else if script.len() == 22 && script[..2] == [0x00, 0x14] {
            11
        } else {
            return Err(PorError::UnsupportedScript);
        }
    };
    let raw = output.serialize();
    let slice = position
        .checked_add(20)
        .and_then(|end| raw.get(position..end))
        .ok_or(PorError::SliceOutOfBounds)?;
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(slice);
    Ok(PubKeyHash(pkh))
}

/// Standard output and input scripts
pub mod script {
    use super::{OP_PUSHDATA1, OP_RETURN};
    use crate::core::types::PubKeyHash;

    pub fn p2pkh(pkh: &PubKeyHash) -> Vec<u8> {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&pkh.0);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    pub fn p2wpkh(pkh: &PubKeyHash) -> Vec<u8> {
        let mut script = vec![0x00, 0x14];
        script.extend_from_slice(&pkh.0);
        script
    }

    pub fn op_return(payload: &[u8]) -> Vec<u8> {
        let mut script = vec![OP_RETURN];
        if payload.len() > 75 {
            script.push(OP_PUSHDATA1);
        }
        script.push(payload.len() as u8);
        script.extend_from_slice(payload);
        script
    }

    /// Signature script spending a P2PKH output
    pub fn p2pkh_sig(signature: &[u8], public_key: &[u8]) -> Vec<u8> {
        let mut script = vec![signature.len() as u8];
        script.extend_from_slice(signature);
        script.push(public_key.len() as u8);
        script.extend_from_slice(public_key);
        script
    }

    /// Signature script spending a P2SH-wrapped P2WPKH output
    pub fn p2sh_p2wpkh_sig(pkh: &PubKeyHash) -> Vec<u8> {
        let mut script = vec![0x16, 0x00, 0x14];
        script.extend_from_slice(&pkh.0);
        script
    }
}
