//! Fragmenter: split a buffer into fixed-size, indexed fragments.
//!
//! Fragment `i` covers bytes `[i * size, min((i + 1) * size, len))`. Every
//! fragment but the last is exactly `size` bytes; the last is `len % size`
//! bytes (or `size` when that is zero). Fragments own copies of their bytes,
//! so they never alias the buffer they were cut from.

use bytes::{Bytes, BytesMut};

/// Default fragment size in bytes.
pub const DEFAULT_FRAGMENT_SIZE: usize = 64 * 1024;

/// A contiguous slice of the fragmented stream, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    index: u32,
    bytes: Bytes,
}

impl Fragment {
    pub fn new(index: u32, bytes: Bytes) -> Self {
        Self { index, bytes }
    }

    /// Zero-based position within the original stream.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Pair number this fragment belongs to (`index / 2`).
    pub fn pair(&self) -> u32 {
        pair_of(self.index)
    }

    /// Index of the other member of this fragment's pair.
    pub fn sibling(&self) -> u32 {
        sibling(self.index)
    }
}

/// Two consecutive fragments `(F[2k], F[2k+1])` protected by one parity.
#[derive(Debug, Clone, Copy)]
pub struct FragmentPair<'a> {
    pub pair: u32,
    pub first: &'a Fragment,
    pub second: &'a Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("fragment size must be at least 1 byte")]
    ZeroFragmentSize,

    /// Manifests and frame headers carry lengths as `u32`.
    #[error("fragment size {size} exceeds the u32 length field")]
    FragmentSizeTooLarge { size: usize },

    #[error("stream of {len} bytes needs more than u32::MAX fragments of {size} bytes")]
    TooManyFragments { len: usize, size: usize },
}

/// Split `data` into `ceil(len / fragment_size)` fragments. An empty buffer
/// yields no fragments.
pub fn fragment(data: &[u8], fragment_size: usize) -> Result<Vec<Fragment>, FragmentError> {
    if fragment_size == 0 {
        return Err(FragmentError::ZeroFragmentSize);
    }
    if u32::try_from(fragment_size).is_err() {
        return Err(FragmentError::FragmentSizeTooLarge {
            size: fragment_size,
        });
    }
    let count = data.len().div_ceil(fragment_size);
    if count > u32::MAX as usize {
        return Err(FragmentError::TooManyFragments {
            len: data.len(),
            size: fragment_size,
        });
    }

    Ok(data
        .chunks(fragment_size)
        .enumerate()
        .map(|(i, piece)| Fragment::new(i as u32, Bytes::copy_from_slice(piece)))
        .collect())
}

/// Concatenate fragments in index order. The input need not be sorted.
pub fn reassemble(fragments: &[Fragment]) -> Bytes {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.index);

    let total = ordered.iter().map(|f| f.len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for f in ordered {
        out.extend_from_slice(&f.bytes);
    }
    out.freeze()
}

/// Group an index-ordered fragment sequence into parity pairs.
///
/// Returns the pairs and, when the count is odd, the trailing fragment that
/// has no parity protection.
pub fn pairs(fragments: &[Fragment]) -> (Vec<FragmentPair<'_>>, Option<&Fragment>) {
    let mut iter = fragments.chunks_exact(2);
    let pairs = iter
        .by_ref()
        .map(|p| FragmentPair {
            pair: pair_of(p[0].index),
            first: &p[0],
            second: &p[1],
        })
        .collect();
    let unpaired = iter.remainder().first();
    (pairs, unpaired)
}

pub fn pair_of(index: u32) -> u32 {
    index / 2
}

pub fn sibling(index: u32) -> u32 {
    index ^ 1
}
