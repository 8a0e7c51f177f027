//! Simulated downlink: frames every data and parity fragment, drops or
//! corrupts the ones named in the loss plan, and decodes what survives into
//! the receiver's view of the stream.
//!
//! Losses are erasures: a dropped frame never arrives. Corruption flips the
//! first payload byte of a frame that does arrive; parity cannot detect that,
//! only the checksum can.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use downlink_core::fragment::Fragment;
use downlink_core::manifest::Manifest;
use downlink_core::parity::ParityFragment;
use downlink_core::wire::{decode_frame, encode_frame, FragmentKind, HEADER_LEN};

use crate::error::PipelineError;
use crate::stats::TransmissionStats;

/// Which frames the simulated channel loses or damages in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LossPlan {
    /// Data fragment indices to drop.
    pub fragments: BTreeSet<u32>,
    /// Parity pair numbers to drop.
    pub parities: BTreeSet<u32>,
    /// Data fragment indices delivered with a flipped byte.
    pub corrupt: BTreeSet<u32>,
}

impl LossPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn lose_fragments(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            fragments: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_lost_parities(mut self, pairs: impl IntoIterator<Item = u32>) -> Self {
        self.parities.extend(pairs);
        self
    }

    pub fn with_corrupted(mut self, indices: impl IntoIterator<Item = u32>) -> Self {
        self.corrupt.extend(indices);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.parities.is_empty() && self.corrupt.is_empty()
    }

    /// Parse a comma-separated index list such as `"0, 3,5"`. Empty input is
    /// an empty set.
    pub fn parse_list(s: &str) -> Result<BTreeSet<u32>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<u32>()
                    .map_err(|_| format!("'{t}' is not a fragment index"))
            })
            .collect()
    }

    /// Every index must name a fragment (or parity pair) that exists.
    pub fn validate(&self, manifest: &Manifest) -> Result<(), PipelineError> {
        let n = manifest.fragment_count() as u32;
        let pairs = manifest.parity_count() as u32;

        if let Some(&bad) = self.fragments.iter().chain(&self.corrupt).find(|&&i| i >= n) {
            return Err(PipelineError::InvalidArgument(format!(
                "fragment index {bad} out of range (stream has {n} fragments)"
            )));
        }
        if let Some(&bad) = self.parities.iter().find(|&&p| p >= pairs) {
            return Err(PipelineError::InvalidArgument(format!(
                "parity pair {bad} out of range (stream has {pairs} parity fragments)"
            )));
        }
        Ok(())
    }
}

/// What the receiving side holds after transmission.
#[derive(Debug, Default)]
pub struct Received {
    pub data: BTreeMap<u32, Fragment>,
    pub parity: BTreeMap<u32, ParityFragment>,
}

impl Received {
    /// Data fragments that never arrived, with their manifest lengths.
    pub fn missing(&self, manifest: &Manifest) -> Vec<(u32, usize)> {
        manifest
            .fragment_lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| (i as u32, len as usize))
            .filter(|(i, _)| !self.data.contains_key(i))
            .collect()
    }
}

/// Push all fragments through the simulated channel.
pub fn transmit(
    manifest: &Manifest,
    fragments: &[Fragment],
    parities: &[ParityFragment],
    plan: &LossPlan,
    stats: &mut TransmissionStats,
) -> Result<Received, PipelineError> {
    let stream_id = manifest.stream_id;
    let mut received = Received::default();

    let data_frames = fragments
        .iter()
        .map(|f| (FragmentKind::Data, f.index(), f.bytes()));
    let parity_frames = parities
        .iter()
        .map(|p| (FragmentKind::Parity, p.pair(), p.bytes()));

    for (kind, index, payload) in data_frames.chain(parity_frames) {
        let frame = encode_frame(stream_id, kind, index, payload)?;
        stats.frames_sent += 1;
        stats.bytes_on_wire += frame.len() as u64;

        let dropped = match kind {
            FragmentKind::Data => plan.fragments.contains(&index),
            FragmentKind::Parity => plan.parities.contains(&index),
        };
        if dropped {
            stats.frames_dropped += 1;
            match kind {
                FragmentKind::Data => stats.lost_fragments.push(index),
                FragmentKind::Parity => stats.lost_parities.push(index),
            }
            tracing::debug!(stream_id = %stream_id, ?kind, index, "frame dropped");
            continue;
        }

        let frame = if kind == FragmentKind::Data && plan.corrupt.contains(&index) {
            stats.frames_corrupted += 1;
            tracing::debug!(stream_id = %stream_id, index, "frame corrupted in transit");
            flip_first_payload_byte(frame)
        } else {
            frame
        };

        receive(manifest, &frame, &mut received)?;
    }

    Ok(received)
}

fn receive(manifest: &Manifest, frame: &Bytes, received: &mut Received) -> Result<(), PipelineError> {
    let decoded = decode_frame(frame)?;
    if decoded.stream_id != manifest.stream_id {
        tracing::warn!(
            expected = %manifest.stream_id,
            got = %decoded.stream_id,
            "frame from foreign stream, discarding"
        );
        return Ok(());
    }

    match decoded.kind {
        FragmentKind::Data => {
            received
                .data
                .insert(decoded.index, Fragment::new(decoded.index, decoded.payload));
        }
        FragmentKind::Parity => {
            let pair = decoded.index;
            let (Some(first_len), Some(second_len)) = (
                manifest.fragment_len(pair * 2),
                manifest.fragment_len(pair * 2 + 1),
            ) else {
                tracing::warn!(pair, "parity for a pair the manifest does not know, discarding");
                return Ok(());
            };
            received.parity.insert(
                pair,
                ParityFragment::from_parts(pair, decoded.payload, first_len, second_len),
            );
        }
    }
    Ok(())
}

fn flip_first_payload_byte(frame: Bytes) -> Bytes {
    let mut raw = frame.to_vec();
    if let Some(b) = raw.get_mut(HEADER_LEN) {
        *b ^= 0xff;
    }
    Bytes::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use downlink_core::fragment::fragment;
    use downlink_core::parity::compute_parity;

    struct Stream {
        manifest: Manifest,
        fragments: Vec<Fragment>,
        parities: Vec<ParityFragment>,
    }

    fn ten_byte_stream() -> Stream {
        let data: Vec<u8> = (0u8..10).collect();
        let fragments = fragment(&data, 4).unwrap();
        let parities = vec![compute_parity(&fragments[0], &fragments[1]).unwrap()];
        let manifest = Manifest::describe("none", data.len(), &data, 4, &fragments).unwrap();
        Stream {
            manifest,
            fragments,
            parities,
        }
    }

    fn send(s: &Stream, plan: &LossPlan) -> (Received, TransmissionStats) {
        let mut stats = TransmissionStats::default();
        let rx = transmit(&s.manifest, &s.fragments, &s.parities, plan, &mut stats).unwrap();
        (rx, stats)
    }

    #[test]
    fn lossless_channel_delivers_everything() {
        let s = ten_byte_stream();
        let (rx, stats) = send(&s, &LossPlan::none());
        assert_eq!(rx.data.len(), 3);
        assert_eq!(rx.parity.len(), 1);
        assert_eq!(rx.data[&2], s.fragments[2]);
        assert_eq!(rx.parity[&0], s.parities[0]);
        assert_eq!(stats.frames_sent, 4);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.bytes_on_wire, (10 + 4 + 4 * HEADER_LEN) as u64);
        assert!(rx.missing(&s.manifest).is_empty());
    }

    #[test]
    fn dropped_frames_never_arrive() {
        let s = ten_byte_stream();
        let plan = LossPlan::lose_fragments([0]).with_lost_parities([0]);
        let (rx, stats) = send(&s, &plan);
        assert_eq!(rx.missing(&s.manifest), vec![(0, 4)]);
        assert!(rx.parity.is_empty());
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.lost_fragments, vec![0]);
        assert_eq!(stats.lost_parities, vec![0]);
    }

    #[test]
    fn corrupted_frames_arrive_damaged() {
        let s = ten_byte_stream();
        let (rx, stats) = send(&s, &LossPlan::none().with_corrupted([1]));
        assert_eq!(stats.frames_corrupted, 1);
        assert_eq!(rx.data[&1].as_slice(), &[4 ^ 0xff, 5, 6, 7]);
    }

    #[test]
    fn validate_rejects_out_of_range_indices() {
        let s = ten_byte_stream();
        assert!(LossPlan::none().is_empty());
        assert!(!LossPlan::none().with_corrupted([0]).is_empty());
        assert!(LossPlan::lose_fragments([2]).validate(&s.manifest).is_ok());
        assert!(matches!(
            LossPlan::lose_fragments([3]).validate(&s.manifest),
            Err(PipelineError::InvalidArgument(_))
        ));
        assert!(LossPlan::none()
            .with_lost_parities([1])
            .validate(&s.manifest)
            .is_err());
        assert!(LossPlan::none()
            .with_corrupted([9])
            .validate(&s.manifest)
            .is_err());
    }

    #[test]
    fn parse_list_accepts_spaces_and_rejects_garbage() {
        let set = LossPlan::parse_list("0, 3,5,,").unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![0, 3, 5]);
        assert!(LossPlan::parse_list("").unwrap().is_empty());
        assert!(LossPlan::parse_list("1,x").is_err());
        assert!(LossPlan::parse_list("-1").is_err());
    }
}
