//! Factom variable-length integers.
//!
//! Big-endian groups of seven bits; every byte except the last has the high
//! bit set. Zero encodes as a single `0x00`.

use crate::error::CoreError;
use bytes::BufMut;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Appends the encoding of `value` to `buf`.
pub fn put_varint<B: BufMut>(buf: &mut B, value: u64) {
    let mut groups = [0u8; MAX_VARINT_LEN];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7f) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }

    for i in (0..n).rev() {
        let cont = if i == 0 { 0x00 } else { 0x80 };
        buf.put_u8(groups[i] | cont);
    }
}

/// Number of bytes `put_varint` writes for `value`.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decodes a varint at `offset`, returning the value and the bytes consumed.
pub fn read_varint(bytes: &[u8], offset: usize) -> Result<(u64, usize), CoreError> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().skip(offset).enumerate() {
        if i >= MAX_VARINT_LEN || value > (u64::MAX >> 7) {
            return Err(CoreError::InvalidVarint { offset });
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CoreError::Truncated {
        offset: bytes.len(),
        needed: 1,
    })
}
