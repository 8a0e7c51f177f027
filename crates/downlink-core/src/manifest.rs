//! Stream manifest: the out-of-band facts a receiver needs that fragments
//! and parity do not carry themselves.
//!
//! Parity encodes no lengths, so whether a recovered fragment is complete can
//! only be judged against `fragment_lengths`. The codec's block format also
//! needs `original_len` to decompress.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum::checksum;
use crate::fragment::{Fragment, FragmentError};

/// Eight-byte stream identifier: a BLAKE3 prefix of the compressed buffer.
/// Used to tag frames and log lines, never for integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub [u8; 8]);

impl StreamId {
    pub fn derive(compressed: &[u8]) -> Self {
        let digest = blake3::hash(compressed);
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest.as_bytes()[..8]);
        StreamId(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for StreamId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let id: [u8; 8] = raw
            .try_into()
            .map_err(|_| serde::de::Error::custom("stream id must be 8 bytes"))?;
        Ok(StreamId(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub stream_id: StreamId,
    pub codec: String,
    /// Raw input length, required by `Codec::decompress`.
    pub original_len: u64,
    pub compressed_len: u64,
    pub fragment_size: u32,
    /// Length of each data fragment, by index.
    pub fragment_lengths: Vec<u32>,
    /// Additive checksum of the compressed buffer before transmission.
    pub checksum: u32,
}

impl Manifest {
    /// Describe a compressed stream and the fragments cut from it. Sizes that
    /// do not fit the manifest's `u32` fields are rejected, never truncated.
    pub fn describe(
        codec: &str,
        original_len: usize,
        compressed: &[u8],
        fragment_size: usize,
        fragments: &[Fragment],
    ) -> Result<Self, FragmentError> {
        let too_large = |size: usize| FragmentError::FragmentSizeTooLarge { size };
        let fragment_lengths = fragments
            .iter()
            .map(|f| u32::try_from(f.len()).map_err(|_| too_large(f.len())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stream_id: StreamId::derive(compressed),
            codec: codec.to_string(),
            original_len: original_len as u64,
            compressed_len: compressed.len() as u64,
            fragment_size: u32::try_from(fragment_size).map_err(|_| too_large(fragment_size))?,
            fragment_lengths,
            checksum: checksum(compressed),
        })
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_lengths.len()
    }

    /// Recorded length of data fragment `index`, if it exists.
    pub fn fragment_len(&self, index: u32) -> Option<usize> {
        self.fragment_lengths
            .get(index as usize)
            .map(|&len| len as usize)
    }

    /// Number of parity fragments the stream carries (`floor(n / 2)`).
    pub fn parity_count(&self) -> usize {
        self.fragment_lengths.len() / 2
    }

    /// Index of the trailing fragment without parity protection, if any.
    pub fn unpaired(&self) -> Option<u32> {
        let n = self.fragment_lengths.len();
        (n % 2 == 1).then(|| (n - 1) as u32)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
