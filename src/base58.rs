// Fortuna Lottery - Base-58 address codec
use crate::error::{LotteryError, LotteryResult};

/// Alphabet without `0`, `O`, `I` and `l`
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const INVALID: u8 = 0xff;

const fn decode_table() -> [u8; 128] {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

const DECODE_TABLE: [u8; 128] = decode_table();

/// Decode base-58 text into bytes.
///
/// Each leading `1` becomes one leading zero byte; the rest is accumulated
/// as a little-endian big number, multiplying by 58 per character.
pub fn decode(text: &str) -> LotteryResult<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::with_capacity(text.len());

    for c in text.chars() {
        let digit = (c as u32)
            .try_into()
            .ok()
            .and_then(|i: usize| DECODE_TABLE.get(i).copied())
            .filter(|d| *d != INVALID)
            .ok_or_else(|| {
                LotteryError::InvalidEncoding(format!("character {:?} is not base-58", c))
            })?;

        let mut carry = digit as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let leading_zeros = text.bytes().take_while(|b| *b == ALPHABET[0]).count();
    bytes.extend(std::iter::repeat(0).take(leading_zeros));
    bytes.reverse();
    Ok(bytes)
}

/// Encode bytes as base-58 text
pub fn encode(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = Vec::with_capacity(bytes.len() * 138 / 100 + 1);

    for byte in bytes {
        let mut carry = *byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let leading_zeros = bytes.iter().take_while(|b| **b == 0).count();
    let mut text = String::with_capacity(leading_zeros + digits.len());
    text.extend(std::iter::repeat(ALPHABET[0] as char).take(leading_zeros));
    text.extend(digits.iter().rev().map(|d| ALPHABET[*d as usize] as char));
    text
}

/// Decode into a fixed-size array, e.g. a 32-byte public key or blockhash
pub fn decode_array<const N: usize>(text: &str) -> LotteryResult<[u8; N]> {
    let bytes = decode(text)?;
    bytes.as_slice().try_into().map_err(|_| {
        LotteryError::InvalidEncoding(format!("expected {} bytes, got {}", N, bytes.len()))
    })
}
