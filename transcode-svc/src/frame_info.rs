//! Per-access-unit metadata queue.
//!
//! The engine returns pictures with a delay and without timing, so the
//! presentation time, duration and random-access type of every decoded access
//! unit are queued here and popped in presentation order as pictures come out.

/// Stream access point type (ISO/IEC 14496-12 Annex I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SapType {
    /// Not a random access point.
    #[default]
    None,
    /// Closed GOP, decode order equals presentation order.
    Type1,
    /// Closed GOP, leading pictures may follow.
    Type2,
    /// Open GOP.
    Type3,
    /// Gradual decoding refresh.
    Type4,
}

impl SapType {
    /// Map a numeric SAP type; values above 4 are treated as no SAP.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Type1,
            2 => Self::Type2,
            3 => Self::Type3,
            4 => Self::Type4,
            _ => Self::None,
        }
    }

    /// Numeric SAP type.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Type1 => 1,
            Self::Type2 => 2,
            Self::Type3 => 3,
            Self::Type4 => 4,
        }
    }

    /// Whether decoding can start here.
    pub fn is_random_access(self) -> bool {
        self != Self::None
    }
}

/// Metadata of one decoded access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Presentation time, the queue key.
    pub pts: u64,
    /// Duration in stream timescale units.
    pub duration: u32,
    /// Random access type.
    pub sap: SapType,
    /// Decoded only to reach a seek target; never output.
    pub seek: bool,
}

/// Sorted, duplicate-free queue of [`FrameInfo`] keyed by presentation time.
#[derive(Debug, Clone)]
pub struct FrameInfoQueue {
    entries: Vec<FrameInfo>,
    growth: usize,
}

impl FrameInfoQueue {
    /// Create an empty queue that grows `growth` records at a time.
    pub fn new(growth: usize) -> Self {
        Self {
            entries: Vec::new(),
            growth: growth.max(1),
        }
    }

    /// Insert `info` in presentation order unless its time is already queued.
    ///
    /// Returns `false` when an entry with the same time exists; the existing
    /// entry is kept as is.
    pub fn push_if_new(&mut self, info: FrameInfo) -> bool {
        match self.entries.binary_search_by_key(&info.pts, |e| e.pts) {
            Ok(_) => false,
            Err(pos) => {
                if self.entries.len() == self.entries.capacity() {
                    self.entries.reserve_exact(self.growth);
                }
                self.entries.insert(pos, info);
                true
            }
        }
    }

    /// Earliest entry.
    pub fn front(&self) -> Option<&FrameInfo> {
        self.entries.first()
    }

    /// Remove and return the earliest entry.
    pub fn pop_front(&mut self) -> Option<FrameInfo> {
        if self.entries.is_empty() {
            tracing::warn!("Picture produced with no pending frame info");
            return None;
        }
        Some(self.entries.remove(0))
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocated slots.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Queued entries in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = &FrameInfo> {
        self.entries.iter()
    }

    /// Drop all entries and release storage.
    pub fn reset(&mut self) {
        self.entries = Vec::new();
    }
}

impl Default for FrameInfoQueue {
    fn default() -> Self {
        Self::new(crate::FRAME_INFO_GROWTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pts: u64) -> FrameInfo {
        FrameInfo {
            pts,
            duration: 40,
            sap: SapType::None,
            seek: false,
        }
    }

    #[test]
    fn test_sorted_insert() {
        let mut queue = FrameInfoQueue::new(10);
        for pts in [80, 0, 40, 120] {
            assert!(queue.push_if_new(info(pts)));
        }
        let order: Vec<u64> = queue.iter().map(|i| i.pts).collect();
        assert_eq!(order, vec![0, 40, 80, 120]);
    }

    #[test]
    fn test_duplicate_is_ignored() {
        let mut queue = FrameInfoQueue::new(10);
        assert!(queue.push_if_new(info(40)));
        let mut again = info(40);
        again.seek = true;
        assert!(!queue.push_if_new(again));
        assert_eq!(queue.len(), 1);
        assert!(!queue.front().unwrap().seek);
    }

    #[test]
    fn test_pop_front() {
        let mut queue = FrameInfoQueue::new(10);
        queue.push_if_new(info(40));
        queue.push_if_new(info(0));
        assert_eq!(queue.pop_front().map(|i| i.pts), Some(0));
        assert_eq!(queue.pop_front().map(|i| i.pts), Some(40));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_growth_and_reset() {
        let mut queue = FrameInfoQueue::new(10);
        assert_eq!(queue.capacity(), 0);
        queue.push_if_new(info(0));
        assert!(queue.capacity() >= 10);
        for pts in 1..=10 {
            queue.push_if_new(info(pts));
        }
        assert!(queue.capacity() >= 20);
        queue.reset();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 0);
    }

    #[test]
    fn test_sap_type() {
        assert_eq!(SapType::from_u8(3), SapType::Type3);
        assert_eq!(SapType::from_u8(9), SapType::None);
        assert_eq!(SapType::Type1.to_u8(), 1);
        assert!(SapType::Type4.is_random_access());
        assert!(!SapType::default().is_random_access());
    }
}
