//! downlink-core: fragmentation, XOR parity, checksum, codec contract and
//! wire framing for the telemetry downlink pipeline.
//! The orchestrator in downlink-services builds on these pure primitives.

pub mod checksum;
pub mod codec;
pub mod config;
pub mod fragment;
pub mod manifest;
pub mod parity;
pub mod wire;

pub use checksum::checksum;
pub use codec::{Codec, CodecError, CodecKind, Lz4Codec, PassthroughCodec};
pub use fragment::{fragment, reassemble, Fragment, FragmentError, FragmentPair};
pub use manifest::{Manifest, StreamId};
pub use parity::{compute_parity, recover, ParityError, ParityFragment};
