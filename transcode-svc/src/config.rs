//! Decoder settings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SvcError};

/// Layered decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvcDecoderConfig {
    /// Maximum number of dependent channels decoded together.
    pub max_channels: usize,
    /// Extra bytes per output row beyond the picture width.
    pub stride_padding: u32,
    /// Frame info queue growth step, in records.
    pub frame_info_growth: usize,
    /// Quality ceiling applied at start-up and after every reconfiguration,
    /// held at or below the highest DQ id seen in the stream.
    /// `None` decodes every layer.
    pub initial_ceiling: Option<u8>,
}

impl Default for SvcDecoderConfig {
    fn default() -> Self {
        Self {
            max_channels: crate::MAX_CHANNELS,
            stride_padding: crate::STRIDE_PADDING,
            frame_info_growth: crate::FRAME_INFO_GROWTH,
            initial_ceiling: None,
        }
    }
}

impl SvcDecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel limit.
    pub fn with_max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    /// Set the output row padding.
    pub fn with_stride_padding(mut self, padding: u32) -> Self {
        self.stride_padding = padding;
        self
    }

    /// Set the frame info queue growth step.
    pub fn with_frame_info_growth(mut self, growth: usize) -> Self {
        self.frame_info_growth = growth;
        self
    }

    /// Start decoding at most up to `dq_id`.
    pub fn with_initial_ceiling(mut self, dq_id: u8) -> Self {
        self.initial_ceiling = Some(dq_id);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_channels == 0 {
            return Err(SvcError::InvalidConfig(
                "At least one channel is required".into(),
            ));
        }
        if self.frame_info_growth == 0 {
            return Err(SvcError::InvalidConfig(
                "Frame info growth must be non-zero".into(),
            ));
        }
        if let Some(ceiling) = self.initial_ceiling {
            if ceiling > crate::nal::MAX_DQ_ID {
                return Err(SvcError::InvalidConfig(format!(
                    "Initial ceiling {} exceeds the largest DQ id",
                    ceiling
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SvcDecoderConfig::default();
        assert_eq!(config.max_channels, 3);
        assert_eq!(config.stride_padding, 32);
        assert_eq!(config.frame_info_growth, 10);
        assert_eq!(config.initial_ceiling, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders_and_validation() {
        let config = SvcDecoderConfig::new()
            .with_max_channels(2)
            .with_stride_padding(64)
            .with_initial_ceiling(0x10);
        assert_eq!(config.max_channels, 2);
        assert_eq!(config.stride_padding, 64);
        assert!(config.validate().is_ok());

        assert!(SvcDecoderConfig::new().with_max_channels(0).validate().is_err());
        assert!(SvcDecoderConfig::new().with_frame_info_growth(0).validate().is_err());
        assert!(SvcDecoderConfig::new().with_initial_ceiling(0x80).validate().is_err());
    }

    #[test]
    fn test_serde_defaults_missing_fields() {
        let config: SvcDecoderConfig = serde_json::from_str(r#"{"max_channels": 2}"#).unwrap();
        assert_eq!(config.max_channels, 2);
        assert_eq!(config.stride_padding, 32);

        let json = serde_json::to_string(&SvcDecoderConfig::default()).unwrap();
        let back: SvcDecoderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SvcDecoderConfig::default());
    }
}
