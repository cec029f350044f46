//! Cross-channel timestamp synchronization.
//!
//! Each decode step looks at the pending access unit of every channel and
//! picks the one with the smallest decode time. All channels whose pending
//! unit carries that same time are decoded together in that step.

use crate::frame_info::FrameInfo;
use crate::host::{AccessUnit, InputHost};
use crate::registry::{ChannelId, ChannelRegistry};

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// A channel has nothing pending yet; try again later.
    Postpone,
    /// Every channel is drained.
    EndOfStream,
    /// Decode the units matching `key`.
    Reference {
        /// Minimal ordering key across channels.
        key: u64,
        /// Metadata of the reference unit.
        info: FrameInfo,
        /// Channel that holds the reference unit.
        owner: ChannelId,
    },
}

/// Peek every channel and select the reference access unit.
///
/// Clock-signalling units and units without any timestamp are consumed on the
/// way; nothing else is.
pub fn select_reference<H: InputHost + ?Sized>(
    registry: &ChannelRegistry,
    host: &mut H,
) -> SyncDecision {
    let mut eos = 0;
    let mut best: Option<(u64, FrameInfo, ChannelId)> = None;

    for channel in registry.iter() {
        let id = channel.id;
        loop {
            let Some(unit) = host.peek(id) else {
                if host.is_eos(id) {
                    eos += 1;
                    break;
                }
                return SyncDecision::Postpone;
            };
            if unit.is_clock_signal() {
                tracing::trace!(channel = id, "Dropping clock signalling unit");
                host.consume(id);
                continue;
            }
            let Some(key) = unit.ordering_key() else {
                tracing::warn!(channel = id, "Dropping access unit without timestamps");
                host.consume(id);
                continue;
            };
            if best.map_or(true, |(min, _, _)| key < min) {
                best = Some((key, frame_info(unit, key), id));
            }
            break;
        }
    }

    match best {
        _ if eos == registry.len() => SyncDecision::EndOfStream,
        Some((key, info, owner)) => SyncDecision::Reference { key, info, owner },
        None => SyncDecision::Postpone,
    }
}

/// Whether `unit` belongs to the step keyed by `key`.
pub fn is_due(unit: &AccessUnit, key: u64) -> bool {
    unit.ordering_key() == Some(key)
}

fn frame_info(unit: &AccessUnit, key: u64) -> FrameInfo {
    FrameInfo {
        pts: unit.pts.unwrap_or(key),
        duration: unit.duration,
        sap: unit.sap,
        seek: unit.seek,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_info::SapType;
    use crate::host::MemoryInput;
    use crate::registry::Channel;

    fn registry(channels: &[(ChannelId, ChannelId)]) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new(3);
        for &(id, dep) in channels {
            registry.attach(Channel::new(id, dep, None)).unwrap();
        }
        registry
    }

    #[test]
    fn test_picks_minimum_decode_time() {
        let registry = registry(&[(1, 0), (2, 1)]);
        let mut input = MemoryInput::new();
        input.push(1, AccessUnit::new([0x65]).with_dts(40).with_pts(80));
        input.push(2, AccessUnit::new([0x74]).with_dts(20).with_pts(60).with_sap(SapType::Type1));

        match select_reference(&registry, &mut input) {
            SyncDecision::Reference { key, info, owner } => {
                assert_eq!(key, 20);
                assert_eq!(owner, 2);
                assert_eq!(info.pts, 60);
                assert_eq!(info.sap, SapType::Type1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(input.pending(1), 1);
        assert_eq!(input.pending(2), 1);
    }

    #[test]
    fn test_postpone_when_channel_lags() {
        let registry = registry(&[(1, 0), (2, 1)]);
        let mut input = MemoryInput::new();
        input.push(1, AccessUnit::new([0x65]).with_time(0));
        assert_eq!(select_reference(&registry, &mut input), SyncDecision::Postpone);
        assert_eq!(input.pending(1), 1);
    }

    #[test]
    fn test_end_of_stream() {
        let registry = registry(&[(1, 0), (2, 1)]);
        let mut input = MemoryInput::new();
        input.finish(1);
        input.push(2, AccessUnit::new([0x74]).with_time(0));
        assert!(matches!(
            select_reference(&registry, &mut input),
            SyncDecision::Reference { owner: 2, .. }
        ));
        input.consume(2);
        input.finish(2);
        assert_eq!(select_reference(&registry, &mut input), SyncDecision::EndOfStream);
    }

    #[test]
    fn test_clock_and_undated_units_are_dropped() {
        let registry = registry(&[(1, 0)]);
        let mut input = MemoryInput::new();
        input.push(1, AccessUnit::new(Vec::<u8>::new()).with_time(0));
        input.push(1, AccessUnit::new([0x65]));
        input.push(1, AccessUnit::new([0x65]).with_pts(40));

        let decision = select_reference(&registry, &mut input);
        assert!(matches!(
            decision,
            SyncDecision::Reference { key: 40, info: FrameInfo { pts: 40, .. }, owner: 1 }
        ));
        assert_eq!(input.pending(1), 1);
    }

    #[test]
    fn test_pts_falls_back_to_key() {
        let registry = registry(&[(1, 0)]);
        let mut input = MemoryInput::new();
        input.push(1, AccessUnit::new([0x65]).with_dts(7));
        assert!(matches!(
            select_reference(&registry, &mut input),
            SyncDecision::Reference { key: 7, info: FrameInfo { pts: 7, .. }, .. }
        ));
    }

    #[test]
    fn test_is_due() {
        let unit = AccessUnit::new([0x65]).with_dts(10).with_pts(30);
        assert!(is_due(&unit, 10));
        assert!(!is_due(&unit, 30));
    }
}
