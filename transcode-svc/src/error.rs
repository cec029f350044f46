//! Error types for the layered decode adapter.
//!
//! Attach-time failures are returned to the caller and stop the channel from
//! being activated. Per-unit failures never leave [`crate::SvcDecoder::advance`];
//! they are logged and decoding carries on with the next unit.

use thiserror::Error;

use crate::registry::ChannelId;

/// Layered decoder error type.
#[derive(Error, Debug)]
pub enum SvcError {
    /// Too many dependent channels attached to one decoder instance.
    #[error("Channel limit exceeded: at most {limit} channels per decoder")]
    ChannelLimitExceeded { limit: usize },

    /// A second independent (base) channel was offered.
    ///
    /// The stream is not jointly decodable with the current set; the caller
    /// should open a separate decoder for it.
    #[error("Channel {incoming} is a second base layer (already have {existing})")]
    ConflictingBaseLayer {
        existing: ChannelId,
        incoming: ChannelId,
    },

    /// Channel id is already registered.
    #[error("Channel {0} is already attached")]
    DuplicateChannel(ChannelId),

    /// Decoder configuration record could not be parsed.
    #[error("Malformed decoder configuration: {0}")]
    MalformedConfiguration(String),

    /// The decode engine failed to open.
    #[error("Decode engine failed to initialize: {0}")]
    EngineInitFailure(String),

    /// Configuration change that cannot be applied to a running decoder.
    #[error("Unsupported reconfiguration of channel {channel}: {reason}")]
    UnsupportedReconfiguration {
        channel: ChannelId,
        reason: &'static str,
    },

    /// The decode engine rejected one coded unit.
    #[error("Decode engine rejected unit (code {code})")]
    DecodeUnitFailure { code: i32 },

    /// Start-code framing was expected but the buffer has none.
    #[error("No start code found in {len}-byte buffer")]
    MissingStartCode { len: usize },

    /// Length-prefix width outside 1..=4 bytes.
    #[error("Invalid NAL length field size: {0}")]
    InvalidLengthSize(u8),

    /// Invalid decoder settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bitstream parsing error inside a parameter set.
    #[error("Bitstream error: {0}")]
    Bitstream(#[from] BitstreamError),
}

/// Bit-level parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitstreamError {
    /// Ran out of data.
    #[error("Unexpected end of bitstream")]
    UnexpectedEnd,

    /// Exp-Golomb prefix longer than 31 zero bits.
    #[error("Exp-Golomb value too large")]
    ExpGolombOverflow,

    /// Syntax element outside its legal range.
    #[error("Invalid syntax element: {element} = {value}")]
    InvalidSyntax { element: &'static str, value: i64 },
}

/// Result type alias for layered decoder operations.
pub type Result<T> = std::result::Result<T, SvcError>;

impl SvcError {
    /// Create a malformed configuration error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        SvcError::MalformedConfiguration(msg.into())
    }

    /// Check whether decoding can continue after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SvcError::DecodeUnitFailure { .. }
                | SvcError::MissingStartCode { .. }
                | SvcError::UnsupportedReconfiguration { .. }
        )
    }

    /// Check whether the stream should be handed to a separate decoder instance.
    #[must_use]
    pub fn requires_new_instance(&self) -> bool {
        matches!(self, SvcError::ConflictingBaseLayer { .. })
    }
}
