//! Host pipeline seam.
//!
//! The host owns the input streams and the output pin. The decoder pulls
//! access units through [`InputHost`] by channel id and pushes pictures
//! through [`OutputSink`].

use std::collections::{HashMap, VecDeque};

use crate::frame_info::SapType;
use crate::output::{GeometryChange, OutputGeometry};
use crate::registry::ChannelId;

/// One input access unit as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessUnit {
    /// Coded data. Empty for clock-signalling units.
    pub data: Vec<u8>,
    /// Decode time.
    pub dts: Option<u64>,
    /// Presentation time.
    pub pts: Option<u64>,
    /// Duration in stream timescale units.
    pub duration: u32,
    /// Random access type.
    pub sap: SapType,
    /// Decode-only unit preceding a seek target.
    pub seek: bool,
}

impl AccessUnit {
    /// Create an undated access unit.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Set the decode time.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Set the presentation time.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set decode and presentation time to the same value.
    pub fn with_time(self, time: u64) -> Self {
        self.with_dts(time).with_pts(time)
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    /// Set the SAP type.
    pub fn with_sap(mut self, sap: SapType) -> Self {
        self.sap = sap;
        self
    }

    /// Set the seek flag.
    pub fn with_seek(mut self, seek: bool) -> Self {
        self.seek = seek;
        self
    }

    /// Time used to order units across channels: decode time, else
    /// presentation time.
    pub fn ordering_key(&self) -> Option<u64> {
        self.dts.or(self.pts)
    }

    /// Whether this unit only carries clock signalling.
    pub fn is_clock_signal(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pull-side interface to the host's input streams.
pub trait InputHost {
    /// Next pending unit on `channel`, without consuming it.
    fn peek(&mut self, channel: ChannelId) -> Option<&AccessUnit>;

    /// Drop the pending unit on `channel`.
    fn consume(&mut self, channel: ChannelId);

    /// Whether `channel` has reached end of stream.
    fn is_eos(&self, channel: ChannelId) -> bool;
}

/// A picture ready for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPicture {
    /// Presentation time.
    pub pts: u64,
    /// Duration in stream timescale units.
    pub duration: u32,
    /// Random access type of the originating access unit.
    pub sap: SapType,
    /// Planar 4:2:0 data: luma then both chroma planes, `stride` wide.
    pub data: Vec<u8>,
}

/// Push-side interface to the host's output.
pub trait OutputSink {
    /// Output properties changed; called before the first picture using them.
    fn geometry_changed(&mut self, geometry: &OutputGeometry, changed: GeometryChange);

    /// Deliver one picture.
    fn deliver(&mut self, picture: OutputPicture);

    /// No more pictures will follow.
    fn end_of_stream(&mut self);
}

/// Event recorded by [`OutputQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Geometry {
        geometry: OutputGeometry,
        changed: GeometryChange,
    },
    Picture(OutputPicture),
    EndOfStream,
}

/// Sink that records everything it receives.
#[derive(Debug, Clone, Default)]
pub struct OutputQueue {
    events: Vec<OutputEvent>,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in arrival order.
    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// Delivered pictures in arrival order.
    pub fn pictures(&self) -> impl Iterator<Item = &OutputPicture> {
        self.events.iter().filter_map(|e| match e {
            OutputEvent::Picture(p) => Some(p),
            _ => None,
        })
    }

    /// Number of geometry notifications.
    pub fn geometry_updates(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, OutputEvent::Geometry { .. }))
            .count()
    }

    /// Whether end of stream was signalled.
    pub fn is_finished(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, OutputEvent::EndOfStream))
    }

    /// Take the recorded events.
    pub fn drain(&mut self) -> Vec<OutputEvent> {
        std::mem::take(&mut self.events)
    }
}

impl OutputSink for OutputQueue {
    fn geometry_changed(&mut self, geometry: &OutputGeometry, changed: GeometryChange) {
        self.events.push(OutputEvent::Geometry {
            geometry: *geometry,
            changed,
        });
    }

    fn deliver(&mut self, picture: OutputPicture) {
        self.events.push(OutputEvent::Picture(picture));
    }

    fn end_of_stream(&mut self) {
        self.events.push(OutputEvent::EndOfStream);
    }
}

/// In-memory input: one FIFO of access units per channel.
///
/// A channel is at end of stream once [`MemoryInput::finish`] was called and
/// its queue is drained.
#[derive(Debug, Clone, Default)]
pub struct MemoryInput {
    queues: HashMap<ChannelId, VecDeque<AccessUnit>>,
    finished: HashMap<ChannelId, bool>,
}

impl MemoryInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a unit on `channel`.
    pub fn push(&mut self, channel: ChannelId, unit: AccessUnit) {
        self.queues.entry(channel).or_default().push_back(unit);
    }

    /// Mark `channel` as complete.
    pub fn finish(&mut self, channel: ChannelId) {
        self.finished.insert(channel, true);
    }

    /// Units still queued on `channel`.
    pub fn pending(&self, channel: ChannelId) -> usize {
        self.queues.get(&channel).map_or(0, VecDeque::len)
    }
}

impl InputHost for MemoryInput {
    fn peek(&mut self, channel: ChannelId) -> Option<&AccessUnit> {
        self.queues.get(&channel).and_then(VecDeque::front)
    }

    fn consume(&mut self, channel: ChannelId) {
        if let Some(queue) = self.queues.get_mut(&channel) {
            queue.pop_front();
        }
    }

    fn is_eos(&self, channel: ChannelId) -> bool {
        self.finished.get(&channel).copied().unwrap_or(false) && self.pending(channel) == 0
    }
}
