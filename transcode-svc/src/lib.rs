//! Scalable (SVC) H.264 decode adapter for the transcode library.
//!
//! A layered stream arrives as several dependent channels: one base layer and
//! up to two enhancement layers, each with its own packets and timestamps.
//! This crate merges those channels into a single decode sequence for an
//! external layered decode engine and turns what the engine produces into
//! timed output pictures.
//!
//! # Features
//!
//! - **Channel Registry**: base-first ordering of dependent channels, conflict
//!   detection for a second base layer
//! - **Timestamp Synchronization**: picks the access unit with the smallest
//!   decode time across channels, postpones while a channel lags behind
//! - **Unit Extraction**: ISO length-prefixed (1 to 4 byte) and Annex B
//!   start-code framing
//! - **Quality Selection**: dependency/quality (DQ) id ceiling stepped up and
//!   down on request
//! - **Output Assembly**: planar 4:2:0 packing, resolution change
//!   notification, seek picture suppression
//!
//! # Example
//!
//! ```rust,ignore
//! use transcode_svc::{AccessUnit, ChannelParams, MemoryInput, OutputQueue, Step, SvcDecoder};
//!
//! let mut decoder = SvcDecoder::new(|| open_engine());
//! decoder.configure_channel(ChannelParams::base(1).with_decoder_config(avcc))?;
//! decoder.configure_channel(ChannelParams::new(2, 1).with_decoder_config(svcc))?;
//!
//! let mut input = MemoryInput::new();
//! let mut output = OutputQueue::new();
//! loop {
//!     match decoder.advance(&mut input, &mut output) {
//!         Step::EndOfStream => break,
//!         Step::Postponed => refill(&mut input),
//!         _ => {}
//!     }
//! }
//! ```

pub mod bitstream;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod extract;
pub mod frame_info;
pub mod host;
pub mod nal;
pub mod output;
pub mod quality;
pub mod record;
pub mod registry;
pub mod sync;

/// Maximum number of channels decoded together.
pub const MAX_CHANNELS: usize = 3;

/// Bytes added to each output row beyond the picture width.
pub const STRIDE_PADDING: u32 = 32;

/// Growth step of the frame info queue.
pub const FRAME_INFO_GROWTH: usize = 10;

pub use config::SvcDecoderConfig;
pub use decoder::{ChannelParams, Step, SvcDecoder};
pub use engine::{DecodeEngine, DecodeStatus, DecodedPicture, EngineFactory, EngineHandle};
pub use error::{BitstreamError, Result, SvcError};
pub use extract::{units, Framing, Units};
pub use frame_info::{FrameInfo, FrameInfoQueue, SapType};
pub use host::{AccessUnit, InputHost, MemoryInput, OutputEvent, OutputPicture, OutputQueue, OutputSink};
pub use nal::{DqScan, NalUnitType, SvcExtension};
pub use output::{GeometryChange, OutputGeometry, PixelAspectRatio, PixelFormat};
pub use quality::{LayerCommand, LayerController, QualitySwitch, TemporalCommand};
pub use record::{DecoderConfigRecord, PpsInfo, SpsInfo};
pub use registry::{Channel, ChannelId, ChannelRegistry, INDEPENDENT};
pub use sync::{select_reference, SyncDecision};
