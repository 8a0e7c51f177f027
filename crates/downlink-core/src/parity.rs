//! XOR parity coder: one recovery fragment per fragment pair.
//!
//! `parity = first XOR second` over the shorter member's length. Given either
//! member and the parity, the other member is recovered by XOR-ing again.
//!
//! Limitations:
//!   - a pair survives the loss of exactly one member; losing both, or losing
//!     one member together with the parity, is unrecoverable
//!   - when the members differ in length (only the final pair of a stream can),
//!     bytes past the shorter length are not covered and cannot be recovered
//!   - parity does not encode lengths; the receiver checks recovered lengths
//!     against the manifest

use bytes::Bytes;

use crate::fragment::{pair_of, sibling, Fragment};

/// Recovery fragment for pair `pair`, i.e. fragments `2 * pair` and `2 * pair + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityFragment {
    pair: u32,
    bytes: Bytes,
    first_len: usize,
    second_len: usize,
}

impl ParityFragment {
    /// Rebuild a parity fragment received off the wire. Member lengths come
    /// from the manifest.
    pub fn from_parts(pair: u32, bytes: Bytes, first_len: usize, second_len: usize) -> Self {
        Self {
            pair,
            bytes,
            first_len,
            second_len,
        }
    }

    pub fn pair(&self) -> u32 {
        self.pair
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Number of bytes of each member this parity protects.
    pub fn covered(&self) -> usize {
        self.bytes.len()
    }

    pub fn first_len(&self) -> usize {
        self.first_len
    }

    pub fn second_len(&self) -> usize {
        self.second_len
    }

    /// True when the pair members differ in length, leaving the tail of the
    /// longer member unprotected.
    pub fn is_partial(&self) -> bool {
        self.first_len != self.second_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParityError {
    #[error("fragment {index} is not a member of parity pair {pair}")]
    NotAPairMember { index: u32, pair: u32 },

    #[error("fragments {first} and {second} are not a parity pair")]
    NotAPair { first: u32, second: u32 },

    #[error(
        "incomplete recovery of fragment {index}: expected {expected} bytes, parity covers {covered}"
    )]
    IncompleteRecovery {
        index: u32,
        expected: usize,
        covered: usize,
    },
}

/// XOR two fragments of the same pair over their shared length.
///
/// Argument order does not matter: `compute_parity(a, b) == compute_parity(b, a)`.
pub fn compute_parity(a: &Fragment, b: &Fragment) -> Result<ParityFragment, ParityError> {
    if a.index() == b.index() || pair_of(a.index()) != pair_of(b.index()) {
        return Err(ParityError::NotAPair {
            first: a.index(),
            second: b.index(),
        });
    }
    let (first, second) = if a.index() < b.index() { (a, b) } else { (b, a) };

    Ok(ParityFragment {
        pair: pair_of(first.index()),
        bytes: xor_prefix(first.as_slice(), second.as_slice()),
        first_len: first.len(),
        second_len: second.len(),
    })
}

/// Reconstruct the sibling of `known` from the pair's parity.
///
/// The result spans `min(len(known), len(parity))` bytes. `expected_len` is the
/// missing fragment's length from the manifest; if coverage falls short of it
/// the recovery is incomplete and fails.
pub fn recover(
    known: &Fragment,
    parity: &ParityFragment,
    expected_len: usize,
) -> Result<Fragment, ParityError> {
    if known.pair() != parity.pair {
        return Err(ParityError::NotAPairMember {
            index: known.index(),
            pair: parity.pair,
        });
    }
    let missing = sibling(known.index());

    let mut bytes = xor_prefix(known.as_slice(), parity.bytes());
    if bytes.len() < expected_len {
        return Err(ParityError::IncompleteRecovery {
            index: missing,
            expected: expected_len,
            covered: bytes.len(),
        });
    }
    bytes.truncate(expected_len);

    Ok(Fragment::new(missing, bytes))
}

fn xor_prefix(a: &[u8], b: &[u8]) -> Bytes {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x ^ y)
        .collect::<Vec<u8>>()
        .into()
}
