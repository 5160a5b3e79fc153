//! Clarity consensus wire encoding.
//!
//! The minimal subset of the SIP-005 value serialization the exchange
//! needs: unsigned integers, buffers, and principals, plus c32check
//! address decoding so `SP.../ST...` principals can be encoded.

use sha2::{Digest, Sha256};

use super::ChainError;

const TYPE_UINT: u8 = 0x01;
const TYPE_BUFFER: u8 = 0x02;
const TYPE_STANDARD_PRINCIPAL: u8 = 0x05;
const TYPE_CONTRACT_PRINCIPAL: u8 = 0x06;

const C32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A Clarity value the exchange serializes onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarityValue {
    UInt(u128),
    Buffer(Vec<u8>),
    /// Standard principal: address version byte + hash160.
    StandardPrincipal(u8, [u8; 20]),
    /// Contract principal: standard principal plus contract name.
    ContractPrincipal(u8, [u8; 20], String),
}

impl ClarityValue {
    /// Parse a principal from its c32check address form, with an optional
    /// `.contract-name` suffix.
    pub fn principal(address: &str) -> Result<Self, ChainError> {
        match address.split_once('.') {
            Some((addr, contract)) => {
                let (version, hash) = c32_address_decode(addr)?;
                if contract.is_empty() || contract.len() > 128 {
                    return Err(ChainError::Codec(format!(
                        "bad contract name in principal: {}",
                        address
                    )));
                }
                Ok(ClarityValue::ContractPrincipal(
                    version,
                    hash,
                    contract.to_string(),
                ))
            }
            None => {
                let (version, hash) = c32_address_decode(address)?;
                Ok(ClarityValue::StandardPrincipal(version, hash))
            }
        }
    }

    /// Consensus-serialize this value.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(&mut out);
        out
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            ClarityValue::UInt(value) => {
                out.push(TYPE_UINT);
                out.extend_from_slice(&value.to_be_bytes());
            }
            ClarityValue::Buffer(bytes) => {
                out.push(TYPE_BUFFER);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            ClarityValue::StandardPrincipal(version, hash) => {
                out.push(TYPE_STANDARD_PRINCIPAL);
                out.push(*version);
                out.extend_from_slice(hash);
            }
            ClarityValue::ContractPrincipal(version, hash, name) => {
                out.push(TYPE_CONTRACT_PRINCIPAL);
                out.push(*version);
                out.extend_from_slice(hash);
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
        }
    }
}

/// Decode a c32check Stacks address (`S` + version char + payload) into
/// its version byte and hash160, verifying the double-SHA-256 checksum.
pub fn c32_address_decode(address: &str) -> Result<(u8, [u8; 20]), ChainError> {
    let upper = address.to_uppercase();
    let rest = upper
        .strip_prefix('S')
        .ok_or_else(|| ChainError::Codec(format!("not a Stacks address: {}", address)))?;
    if rest.len() < 6 {
        return Err(ChainError::Codec(format!("address too short: {}", address)));
    }

    let version_char = rest.as_bytes()[0];
    let version = c32_char_value(version_char)
        .ok_or_else(|| ChainError::Codec(format!("bad version char in {}", address)))?;

    let payload = c32_decode(&rest[1..])?;
    if payload.len() < 4 {
        return Err(ChainError::Codec(format!("address payload too short: {}", address)));
    }
    let (data, checksum) = payload.split_at(payload.len() - 4);
    if data.len() != 20 {
        return Err(ChainError::Codec(format!(
            "address hash must be 20 bytes, got {}",
            data.len()
        )));
    }
    if checksum != c32_checksum(version, data) {
        return Err(ChainError::Codec(format!("bad address checksum: {}", address)));
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(data);
    Ok((version, hash))
}

/// Encode a version byte + hash160 as a c32check Stacks address.
pub fn c32_address_encode(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = hash.to_vec();
    payload.extend_from_slice(&c32_checksum(version, hash));
    format!(
        "S{}{}",
        C32_ALPHABET[(version & 0x1f) as usize] as char,
        c32_encode(&payload)
    )
}

fn c32_checksum(version: u8, data: &[u8]) -> [u8; 4] {
    let mut preimage = vec![version];
    preimage.extend_from_slice(data);
    let first = Sha256::digest(&preimage);
    let second = Sha256::digest(first);
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&second[..4]);
    checksum
}

fn c32_char_value(c: u8) -> Option<u8> {
    // Crockford homoglyphs fold into their canonical digits
    let c = match c {
        b'O' => b'0',
        b'L' | b'I' => b'1',
        other => other,
    };
    C32_ALPHABET.iter().position(|&a| a == c).map(|i| i as u8)
}

fn c32_encode(data: &[u8]) -> String {
    let mut bits: Vec<u8> = Vec::with_capacity(data.len() * 8);
    for byte in data {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    // left-pad to a multiple of five bits
    let pad = (5 - bits.len() % 5) % 5;
    let mut padded = vec![0u8; pad];
    padded.extend_from_slice(&bits);

    let mut out = String::with_capacity(padded.len() / 5);
    for chunk in padded.chunks(5) {
        let mut value = 0usize;
        for bit in chunk {
            value = (value << 1) | *bit as usize;
        }
        out.push(C32_ALPHABET[value] as char);
    }

    let trimmed = out.trim_start_matches('0');
    let leading_zero_bytes = data.iter().take_while(|&&b| b == 0).count();
    format!("{}{}", "0".repeat(leading_zero_bytes), trimmed)
}

fn c32_decode(input: &str) -> Result<Vec<u8>, ChainError> {
    let leading_zero_digits = input.bytes().take_while(|&b| b == b'0').count();

    let mut bits: Vec<u8> = Vec::with_capacity(input.len() * 5);
    for c in input.bytes() {
        let value = c32_char_value(c)
            .ok_or_else(|| ChainError::Codec(format!("invalid c32 digit: {}", c as char)))?;
        for shift in (0..5).rev() {
            bits.push((value >> shift) & 1);
        }
    }

    // rebuild bytes from the right; spare high bits must be zero
    let mut bytes: Vec<u8> = Vec::with_capacity(bits.len() / 8 + 1);
    let mut end = bits.len();
    while end > 0 {
        let start = end.saturating_sub(8);
        let mut value = 0u8;
        for bit in &bits[start..end] {
            value = (value << 1) | *bit;
        }
        bytes.push(value);
        end = start;
    }
    bytes.reverse();

    let nonzero_from = bytes.iter().take_while(|&&b| b == 0).count();
    let mut out = vec![0u8; leading_zero_digits];
    out.extend_from_slice(&bytes[nonzero_from..]);
    Ok(out)
}
