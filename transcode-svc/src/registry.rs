//! Input channel registry.
//!
//! Channels are kept base-first: every enhancement channel sits after the
//! channel it depends on, so feeding units in registry order always gives the
//! engine lower layers before the layers predicted from them.

use crate::error::{Result, SvcError};

/// Host-assigned channel identifier.
pub type ChannelId = u32;

/// Dependency id of an independently decodable (base) channel.
pub const INDEPENDENT: ChannelId = 0;

/// One attached input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Channel this one is predicted from, [`INDEPENDENT`] for the base.
    pub dependency_id: ChannelId,
    /// CRC-32 of the last decoder configuration record seen on this channel.
    pub config_crc: Option<u32>,
}

impl Channel {
    /// Create a channel description.
    pub fn new(id: ChannelId, dependency_id: ChannelId, config_crc: Option<u32>) -> Self {
        Self {
            id,
            dependency_id,
            config_crc,
        }
    }

    /// Whether this channel carries the base layer.
    pub fn is_base(&self) -> bool {
        self.dependency_id == INDEPENDENT
    }
}

/// Outcome of a configuration update on an attached channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfiguration {
    /// Same checksum as before, nothing to do.
    Unchanged,
    /// The base layer configuration changed; decoding must restart.
    BaseChanged,
}

/// Outcome of a detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// No channel with that id was attached.
    Unknown,
    /// The base was removed; the registry is now empty.
    Base,
    /// One enhancement channel was removed.
    Enhancement,
}

/// Ordered set of channels decoded together.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    capacity: usize,
}

impl ChannelRegistry {
    /// Create an empty registry holding at most `capacity` channels.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of channels.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of attached channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is attached.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in decode order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Channel ids in decode order.
    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|c| c.id).collect()
    }

    /// Look up a channel.
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Whether `id` is attached.
    pub fn contains(&self, id: ChannelId) -> bool {
        self.get(id).is_some()
    }

    /// Decode-order position of `id`.
    pub fn position(&self, id: ChannelId) -> Option<usize> {
        self.channels.iter().position(|c| c.id == id)
    }

    /// The base channel, if attached.
    pub fn base(&self) -> Option<&Channel> {
        self.channels.iter().find(|c| c.is_base())
    }

    /// Attach a channel and return its decode-order position.
    ///
    /// The registry is left untouched on error.
    pub fn attach(&mut self, channel: Channel) -> Result<usize> {
        if self.contains(channel.id) {
            return Err(SvcError::DuplicateChannel(channel.id));
        }
        if channel.is_base() {
            if let Some(base) = self.base() {
                return Err(SvcError::ConflictingBaseLayer {
                    existing: base.id,
                    incoming: channel.id,
                });
            }
        }
        if self.channels.len() >= self.capacity {
            return Err(SvcError::ChannelLimitExceeded {
                limit: self.capacity,
            });
        }

        let slot = self
            .channels
            .iter()
            .enumerate()
            .find_map(|(i, existing)| {
                if !channel.is_base() && existing.id == channel.dependency_id {
                    Some(i + 1)
                } else if existing.dependency_id == channel.id {
                    Some(i)
                } else {
                    None
                }
            })
            .unwrap_or(self.channels.len());
        self.channels.insert(slot, channel);
        self.order_by_dependency();

        let position = self.position(channel.id).unwrap_or(slot);
        tracing::debug!(
            channel = channel.id,
            depends_on = channel.dependency_id,
            position,
            "Attached channel"
        );
        Ok(position)
    }

    /// Stable topological pass: keep the current order except where a channel
    /// precedes its parent. Channels whose parent is not attached keep their
    /// place; cycles are left in attach order at the end.
    fn order_by_dependency(&mut self) {
        let mut pending = std::mem::take(&mut self.channels);
        let mut ordered = Vec::with_capacity(self.capacity.max(pending.len()));
        while !pending.is_empty() {
            let ready = pending.iter().position(|c| {
                c.is_base() || !pending.iter().any(|p| p.id == c.dependency_id)
            });
            match ready {
                Some(i) => ordered.push(pending.remove(i)),
                None => {
                    tracing::warn!(
                        channels = ?pending.iter().map(|c| c.id).collect::<Vec<_>>(),
                        "Circular channel dependency"
                    );
                    ordered.append(&mut pending);
                }
            }
        }
        self.channels = ordered;
    }

    /// Remove a channel. Removing the base empties the registry.
    pub fn detach(&mut self, id: ChannelId) -> Detached {
        let Some(pos) = self.position(id) else {
            return Detached::Unknown;
        };
        if self.channels[pos].is_base() {
            self.channels.clear();
            tracing::debug!(channel = id, "Detached base channel");
            Detached::Base
        } else {
            self.channels.remove(pos);
            tracing::debug!(channel = id, "Detached enhancement channel");
            Detached::Enhancement
        }
    }

    /// Remove a single entry, whatever its role. Used to roll back an attach.
    pub(crate) fn remove(&mut self, id: ChannelId) -> Option<Channel> {
        let pos = self.position(id)?;
        Some(self.channels.remove(pos))
    }

    /// Record a new configuration checksum for an attached channel.
    pub fn reconfigure(
        &mut self,
        id: ChannelId,
        config_crc: Option<u32>,
    ) -> Result<Reconfiguration> {
        let channel = self
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(SvcError::UnsupportedReconfiguration {
                channel: id,
                reason: "channel is not attached",
            })?;
        if channel.config_crc == config_crc {
            return Ok(Reconfiguration::Unchanged);
        }
        if !channel.is_base() {
            return Err(SvcError::UnsupportedReconfiguration {
                channel: id,
                reason: "enhancement layer configuration changed",
            });
        }
        channel.config_crc = config_crc;
        Ok(Reconfiguration::BaseChanged)
    }

    /// Drop every channel.
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(crate::MAX_CHANNELS)
    }
}
