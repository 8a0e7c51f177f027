//! Codec contract: the compression primitive the pipeline treats as a black box.
//!
//! The pipeline needs exactly two things from a codec: `compress` and a
//! `decompress` that is told the original length. Codecs must be deterministic
//! and lossless for valid input. Calls may be slow; the orchestrator runs them
//! on the blocking pool under a timeout.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub trait Codec: Send + Sync + 'static {
    /// Short stable name, reported in stats and the manifest.
    fn name(&self) -> &'static str;

    fn compress(&self, input: &[u8]) -> Result<Bytes, CodecError>;

    /// Inverse of `compress`. Output must be exactly `original_len` bytes.
    fn decompress(&self, input: &[u8], original_len: usize) -> Result<Bytes, CodecError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{codec}: compression failed: {reason}")]
    Compress { codec: &'static str, reason: String },

    #[error("{codec}: decompression failed: {reason}")]
    Decompress { codec: &'static str, reason: String },

    #[error("{codec}: decompressed {actual} bytes, expected {expected}")]
    LengthMismatch {
        codec: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// LZ4 block format, no frame header. The original length travels out of band
/// (in the manifest), as the block format requires.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, input: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(lz4_flex::block::compress(input)))
    }

    fn decompress(&self, input: &[u8], original_len: usize) -> Result<Bytes, CodecError> {
        let out = lz4_flex::block::decompress(input, original_len).map_err(|e| {
            CodecError::Decompress {
                codec: self.name(),
                reason: e.to_string(),
            }
        })?;
        if out.len() != original_len {
            return Err(CodecError::LengthMismatch {
                codec: self.name(),
                expected: original_len,
                actual: out.len(),
            });
        }
        Ok(Bytes::from(out))
    }
}

/// Identity codec. Useful when the input is already compressed and for
/// exercising the fragment/parity path on known bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, input: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(input))
    }

    fn decompress(&self, input: &[u8], original_len: usize) -> Result<Bytes, CodecError> {
        if input.len() != original_len {
            return Err(CodecError::LengthMismatch {
                codec: self.name(),
                expected: original_len,
                actual: input.len(),
            });
        }
        Ok(Bytes::copy_from_slice(input))
    }
}

/// Codec selection as it appears in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Lz4,
    #[serde(alias = "passthrough")]
    None,
}

impl CodecKind {
    pub fn build(self) -> std::sync::Arc<dyn Codec> {
        match self {
            CodecKind::Lz4 => std::sync::Arc::new(Lz4Codec),
            CodecKind::None => std::sync::Arc::new(PassthroughCodec),
        }
    }
}

impl std::str::FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lz4" => Ok(CodecKind::Lz4),
            "none" | "passthrough" => Ok(CodecKind::None),
            other => Err(format!("unknown codec '{other}' (expected lz4 or none)")),
        }
    }
}
