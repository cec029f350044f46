//! Quality layer selection.
//!
//! The controller tracks the highest dependency/quality (DQ) id seen in the
//! stream and an optional ceiling requested by the host. For each access unit
//! it hands the engine a [`LayerCommand`] naming the highest layer to decode.

use std::collections::BTreeSet;

use crate::nal::DqScan;

/// Highest temporal id; decoding at this level keeps every temporal layer.
pub const MAX_TEMPORAL_ID: u8 = 7;

/// Host request to change the decoded quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualitySwitch {
    Up,
    Down,
}

/// Pending temporal layer change passed to the engine once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TemporalCommand {
    #[default]
    None,
    Up,
    Down,
}

/// Layer selection handed to the engine with every coded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerCommand {
    /// Highest DQ id present in the stream so far.
    pub max_dq_id: u8,
    /// Highest DQ id to decode and output.
    pub target_dq_id: u8,
    /// Highest temporal id to decode.
    pub temporal_id: u8,
    pub temporal_command: TemporalCommand,
}

impl LayerCommand {
    /// Command used while feeding parameter sets at attach time.
    pub fn initial() -> Self {
        Self {
            max_dq_id: u8::MAX,
            target_dq_id: 0,
            temporal_id: 0,
            temporal_command: TemporalCommand::None,
        }
    }
}

/// Quality layer controller.
///
/// A configured initial ceiling is a preference: it is held at or below the
/// observed maximum until the host moves the ceiling itself.
#[derive(Debug, Clone)]
pub struct LayerController {
    initial_ceiling: Option<u8>,
    ceiling: Option<u8>,
    max_dq_id: u8,
    observed: BTreeSet<u8>,
    temporal_id: u8,
    temporal_command: TemporalCommand,
}

impl LayerController {
    /// Create a controller. `initial_ceiling` is restored on every reset.
    pub fn new(initial_ceiling: Option<u8>) -> Self {
        Self {
            initial_ceiling,
            ceiling: None,
            max_dq_id: 0,
            observed: BTreeSet::new(),
            temporal_id: MAX_TEMPORAL_ID,
            temporal_command: TemporalCommand::None,
        }
    }

    /// Requested ceiling, `None` when decoding everything.
    ///
    /// Never above [`max_dq_id`](Self::max_dq_id).
    pub fn ceiling(&self) -> Option<u8> {
        self.ceiling
            .or_else(|| self.initial_ceiling.map(|dq_id| dq_id.min(self.max_dq_id)))
    }

    /// Highest DQ id observed.
    pub fn max_dq_id(&self) -> u8 {
        self.max_dq_id
    }

    /// DQ ids observed so far, ascending.
    pub fn observed(&self) -> impl Iterator<Item = u8> + '_ {
        self.observed.iter().copied()
    }

    /// Current temporal id.
    pub fn temporal_id(&self) -> u8 {
        self.temporal_id
    }

    /// Apply a host request. Returns whether the ceiling moved.
    pub fn request(&mut self, switch: QualitySwitch) -> bool {
        match switch {
            QualitySwitch::Up => self.request_up(),
            QualitySwitch::Down => self.request_down(),
        }
    }

    /// Step one layer up.
    pub fn request_up(&mut self) -> bool {
        let Some(current) = self.ceiling() else {
            // unset means "all layers"; pin it to what the stream has
            self.ceiling = Some(self.max_dq_id);
            return true;
        };
        if current >= self.max_dq_id {
            return false;
        }
        let next = self
            .observed
            .range(current.saturating_add(1)..=self.max_dq_id)
            .next()
            .copied()
            .unwrap_or(current + 1);
        self.move_to(next, TemporalCommand::Up);
        true
    }

    /// Step one layer down.
    pub fn request_down(&mut self) -> bool {
        let current = match self.ceiling() {
            Some(current) if current > 0 => current,
            _ => return false,
        };
        let next = self
            .observed
            .range(..current)
            .next_back()
            .copied()
            .unwrap_or(current - 1);
        self.move_to(next, TemporalCommand::Down);
        true
    }

    fn move_to(&mut self, dq_id: u8, command: TemporalCommand) {
        tracing::debug!(from = ?self.ceiling(), to = dq_id, max = self.max_dq_id, "Quality switch");
        self.ceiling = Some(dq_id);
        self.temporal_command = command;
    }

    /// Record the layers of one access unit; returns its highest DQ id.
    pub fn observe(&mut self, scan: &DqScan) -> u8 {
        if self.max_dq_id <= scan.max_dq_id {
            self.max_dq_id = scan.max_dq_id;
        }
        self.observed.extend(scan.present.iter().copied());
        scan.max_dq_id
    }

    /// Selection for an access unit whose highest DQ id is `au_max`.
    ///
    /// A pending temporal command is handed out once.
    pub fn command_for(&mut self, au_max: u8) -> LayerCommand {
        let target_dq_id = match self.ceiling() {
            Some(ceiling) => au_max.min(ceiling),
            None => au_max,
        };
        LayerCommand {
            max_dq_id: self.max_dq_id,
            target_dq_id,
            temporal_id: self.temporal_id,
            temporal_command: std::mem::take(&mut self.temporal_command),
        }
    }

    /// Forget the stream's layers and restore the initial ceiling.
    pub fn reset(&mut self) {
        *self = Self::new(self.initial_ceiling);
    }
}

impl Default for LayerController {
    fn default() -> Self {
        Self::new(None)
    }
}
