//! Additive 32-bit checksum.
//!
//! A coarse sanity check, not an integrity guarantee: the sum is taken over
//! byte values, so any two buffers holding the same multiset of bytes collide.
//! It is computed on the compressed buffer before transmission and again on
//! the reassembled buffer after recovery.

/// Sum of all bytes, wrapping modulo 2^32. Never fails.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &byte| acc.wrapping_add(u32::from(byte)))
}
