//! Layered decoder facade.
//!
//! [`SvcDecoder`] owns every piece of per-instance state: the channel
//! registry, the engine handle, the frame info queue, the layer controller and
//! the output assembler. The host drives it by configuring channels and
//! calling [`SvcDecoder::advance`] until it reports end of stream.

use std::collections::HashMap;

use crate::config::SvcDecoderConfig;
use crate::engine::{DecodeStatus, DecodedPicture, EngineFactory, EngineHandle};
use crate::error::{Result, SvcError};
use crate::extract::{self, Framing};
use crate::frame_info::FrameInfoQueue;
use crate::host::{AccessUnit, InputHost, OutputSink};
use crate::nal::{DqScan, NalUnitType};
use crate::output::{Assembled, OutputAssembler, OutputGeometry, PixelAspectRatio};
use crate::quality::{LayerCommand, LayerController, QualitySwitch};
use crate::record::{self, DecoderConfigRecord, PpsInfo, SpsInfo};
use crate::registry::{Channel, ChannelId, ChannelRegistry, Detached, INDEPENDENT};
use crate::sync::{self, SyncDecision};

/// Channel description passed on attach or reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelParams {
    pub id: ChannelId,
    /// Channel this one depends on, [`INDEPENDENT`] for the base layer.
    pub dependency_id: ChannelId,
    /// Raw decoder configuration record. `None` for start-code streams.
    pub decoder_config: Option<Vec<u8>>,
}

impl ChannelParams {
    /// Describe a channel without configuration record.
    pub fn new(id: ChannelId, dependency_id: ChannelId) -> Self {
        Self {
            id,
            dependency_id,
            decoder_config: None,
        }
    }

    /// Describe the base channel.
    pub fn base(id: ChannelId) -> Self {
        Self::new(id, INDEPENDENT)
    }

    /// Attach a decoder configuration record.
    pub fn with_decoder_config(mut self, record: impl Into<Vec<u8>>) -> Self {
        self.decoder_config = Some(record.into());
        self
    }
}

/// Result of one [`SvcDecoder::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No channel attached.
    Idle,
    /// A channel has no pending access unit yet.
    Postponed,
    /// Units were decoded but no picture came out.
    NeedMoreData,
    /// A picture was delivered.
    Emitted { pts: u64 },
    /// A picture was decoded for a seek and dropped.
    Suppressed { pts: u64 },
    /// All channels are drained.
    EndOfStream,
}

impl Step {
    /// Whether calling `advance` again can make progress without new input.
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            Step::NeedMoreData | Step::Emitted { .. } | Step::Suppressed { .. }
        )
    }
}

/// Layered (SVC) decode adapter.
pub struct SvcDecoder<F: EngineFactory> {
    config: SvcDecoderConfig,
    factory: F,
    registry: ChannelRegistry,
    engine: Option<EngineHandle>,
    framing: Framing,
    records: HashMap<ChannelId, DecoderConfigRecord>,
    frames: FrameInfoQueue,
    layers: LayerController,
    output: OutputAssembler,
    eos_signalled: bool,
}

impl<F: EngineFactory> SvcDecoder<F> {
    /// Create a decoder with default settings.
    pub fn new(factory: F) -> Self {
        let config = SvcDecoderConfig::default();
        Self::build(config, factory)
    }

    /// Create a decoder with custom settings.
    pub fn with_config(config: SvcDecoderConfig, factory: F) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, factory))
    }

    fn build(config: SvcDecoderConfig, factory: F) -> Self {
        Self {
            registry: ChannelRegistry::new(config.max_channels),
            engine: None,
            framing: Framing::StartCode,
            records: HashMap::new(),
            frames: FrameInfoQueue::new(config.frame_info_growth),
            layers: LayerController::new(config.initial_ceiling),
            output: OutputAssembler::new(config.stride_padding),
            eos_signalled: false,
            config,
            factory,
        }
    }

    /// Decoder settings.
    pub fn config(&self) -> &SvcDecoderConfig {
        &self.config
    }

    /// Whether a decode engine is open.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Attached channel ids in decode order.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.registry.ids()
    }

    /// Current output geometry.
    pub fn geometry(&self) -> &OutputGeometry {
        self.output.geometry()
    }

    /// Quality layer state.
    pub fn layer_state(&self) -> &LayerController {
        &self.layers
    }

    /// Current unit framing.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Frame infos waiting for a picture.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Attach a channel or apply a new configuration to an attached one.
    ///
    /// On error nothing changes.
    pub fn configure_channel(&mut self, params: ChannelParams) -> Result<()> {
        let ChannelParams {
            id,
            dependency_id,
            decoder_config,
        } = params;
        let decoder_config = decoder_config.filter(|data| !data.is_empty());
        let crc = decoder_config.as_deref().map(record::checksum);
        let existing = self.registry.get(id).copied();

        if let Some(channel) = existing {
            if channel.config_crc == crc {
                tracing::debug!(channel = id, "Configuration unchanged");
                return Ok(());
            }
            if !channel.is_base() {
                tracing::warn!(channel = id, "Enhancement layer configuration changed");
                return Err(SvcError::UnsupportedReconfiguration {
                    channel: id,
                    reason: "enhancement layer configuration changed",
                });
            }
        }
        if crc.is_none() && self.framing != Framing::StartCode {
            tracing::warn!(channel = id, "Start-code channel on a length-prefixed decoder");
            return Err(SvcError::UnsupportedReconfiguration {
                channel: id,
                reason: "cannot mix start-code and length-prefixed framing",
            });
        }

        let record = decoder_config
            .as_deref()
            .map(DecoderConfigRecord::parse)
            .transpose()?;
        let is_base = existing.map_or(dependency_id == INDEPENDENT, |c| c.is_base());
        let framing = match &record {
            Some(r) if is_base || self.registry.base().is_none() => {
                Framing::length_prefixed(r.nal_length_size)?
            }
            Some(_) => self.framing,
            None => Framing::StartCode,
        };

        match existing {
            Some(_) => self.restart(id, crc, record, framing)?,
            None => self.attach(Channel::new(id, dependency_id, crc), record, framing)?,
        }

        self.layers.reset();
        self.output.mark_configured();
        self.eos_signalled = false;
        tracing::info!(
            channel = id,
            depends_on = dependency_id,
            length_size = framing.length_size(),
            width = self.output.geometry().width,
            height = self.output.geometry().height,
            "Configured channel"
        );
        Ok(())
    }

    fn attach(
        &mut self,
        channel: Channel,
        record: Option<DecoderConfigRecord>,
        framing: Framing,
    ) -> Result<()> {
        self.registry.attach(channel)?;
        if self.engine.is_none() {
            match EngineHandle::open(&mut self.factory) {
                Ok(engine) => self.engine = Some(engine),
                Err(err) => {
                    self.registry.remove(channel.id);
                    return Err(err);
                }
            }
        }
        self.framing = framing;

        match record {
            Some(record) => {
                if let Some(engine) = self.engine.as_mut() {
                    feed_parameter_sets(engine, &mut self.output, channel.id, &record);
                }
                self.records.insert(channel.id, record);
            }
            None => self.output.set_pixel_aspect(PixelAspectRatio::SQUARE),
        }
        Ok(())
    }

    /// New base configuration: reopen the engine and replay every channel's
    /// parameter sets into it.
    fn restart(
        &mut self,
        id: ChannelId,
        crc: Option<u32>,
        record: Option<DecoderConfigRecord>,
        framing: Framing,
    ) -> Result<()> {
        let engine = EngineHandle::open(&mut self.factory)?;
        self.registry.reconfigure(id, crc)?;
        tracing::info!(channel = id, "Base layer reconfigured, restarting engine");

        self.engine = Some(engine);
        self.framing = framing;
        match record {
            Some(record) => self.records.insert(id, record),
            None => self.records.remove(&id),
        };
        self.output.reset();

        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        for channel in self.registry.iter() {
            match self.records.get(&channel.id) {
                Some(record) => feed_parameter_sets(engine, &mut self.output, channel.id, record),
                None => self.output.set_pixel_aspect(PixelAspectRatio::SQUARE),
            }
        }
        Ok(())
    }

    /// Detach a channel. Removing the base tears down all decode state.
    pub fn remove_channel(&mut self, id: ChannelId) {
        match self.registry.detach(id) {
            Detached::Unknown => tracing::debug!(channel = id, "Remove of unknown channel"),
            Detached::Enhancement => {
                self.records.remove(&id);
            }
            Detached::Base => {
                tracing::info!(channel = id, "Base channel removed, closing decoder");
                self.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.registry.clear();
        self.engine = None;
        self.framing = Framing::StartCode;
        self.records.clear();
        self.frames.reset();
        self.layers.reset();
        self.output.reset();
        self.eos_signalled = false;
    }

    /// Ask for a higher or lower quality layer. Returns whether the selection
    /// changed.
    pub fn request_quality(&mut self, switch: QualitySwitch) -> bool {
        self.layers.request(switch)
    }

    /// Run one decode step.
    #[tracing::instrument(level = "trace", skip(self, host, sink))]
    pub fn advance<H, S>(&mut self, host: &mut H, sink: &mut S) -> Step
    where
        H: InputHost + ?Sized,
        S: OutputSink + ?Sized,
    {
        if self.registry.is_empty() {
            return Step::Idle;
        }

        let (key, info) = match sync::select_reference(&self.registry, host) {
            SyncDecision::Postpone => return Step::Postponed,
            SyncDecision::EndOfStream => {
                if !self.eos_signalled {
                    tracing::info!("End of stream");
                    sink.end_of_stream();
                    self.eos_signalled = true;
                }
                return Step::EndOfStream;
            }
            SyncDecision::Reference { key, info, .. } => (key, info),
        };
        self.eos_signalled = false;
        if !self.frames.push_if_new(info) {
            tracing::trace!(pts = info.pts, "Frame info already queued");
        }

        let mut picture = None;
        for id in self.registry.ids() {
            let Some(unit) = host.peek(id) else {
                continue;
            };
            if !sync::is_due(unit, key) {
                continue;
            }
            if let Some(decoded) = self.decode_access_unit(id, unit) {
                picture = Some(decoded);
            }
            host.consume(id);
        }

        let Some(picture) = picture else {
            return Step::NeedMoreData;
        };
        match self.output.assemble(&picture, &mut self.frames, sink) {
            Assembled::Emitted(info) => Step::Emitted { pts: info.pts },
            Assembled::Suppressed(info) => Step::Suppressed { pts: info.pts },
            Assembled::Missing | Assembled::Rejected(_) => Step::NeedMoreData,
        }
    }

    fn decode_access_unit(&mut self, channel: ChannelId, unit: &AccessUnit) -> Option<DecodedPicture> {
        let units = match extract::units(&unit.data, self.framing) {
            Ok(units) => units,
            Err(err) => {
                tracing::warn!(channel, error = %err, "Dropping non-decodable access unit");
                return None;
            }
        };

        let au_max = self.layers.observe(&DqScan::scan(units.clone()));
        tracing::info!(
            channel,
            dts = ?unit.dts,
            pts = ?unit.pts,
            size = unit.data.len(),
            max_dq_id = au_max,
            "Decoding access unit"
        );
        let command = self.layers.command_for(au_max);
        let engine = self.engine.as_mut()?;

        let mut picture = None;
        for nal in units {
            trace_unit(channel, nal);
            match engine.decode(nal, &command) {
                DecodeStatus::NeedsMore => {}
                DecodeStatus::Produced(decoded) => picture = Some(decoded),
                DecodeStatus::Error(code) => {
                    let err = SvcError::DecodeUnitFailure { code };
                    tracing::warn!(channel, error = %err, "Error decoding NAL unit");
                }
            }
        }
        picture
    }
}

impl<F: EngineFactory> std::fmt::Debug for SvcDecoder<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvcDecoder")
            .field("channels", &self.registry.ids())
            .field("framing", &self.framing)
            .field("engine", &self.engine.is_some())
            .field("pending_frames", &self.frames.len())
            .field("geometry", self.output.geometry())
            .finish()
    }
}

fn feed_parameter_sets(
    engine: &mut EngineHandle,
    output: &mut OutputAssembler,
    channel: ChannelId,
    record: &DecoderConfigRecord,
) {
    let command = LayerCommand::initial();
    for (i, sps) in record.sequence_parameter_sets.iter().enumerate() {
        match SpsInfo::parse(sps) {
            Ok(info) => {
                // the first SPS describes the layer the channel carries
                if i == 0 {
                    output.grow_to(info.width, info.height, info.pixel_aspect);
                }
                tracing::debug!(
                    channel,
                    sps_id = info.sps_id,
                    width = info.width,
                    height = info.height,
                    size = sps.len(),
                    "Attach: SPS"
                );
            }
            Err(err) => tracing::warn!(channel, error = %err, "Unreadable SPS"),
        }
        if let DecodeStatus::Error(code) = engine.decode(sps, &command) {
            tracing::warn!(channel, code, "Error decoding SPS");
        }
    }
    for pps in &record.picture_parameter_sets {
        match PpsInfo::parse(pps) {
            Ok(info) => tracing::debug!(
                channel,
                pps_id = info.pps_id,
                sps_id = info.sps_id,
                size = pps.len(),
                "Attach: PPS"
            ),
            Err(err) => tracing::warn!(channel, error = %err, "Unreadable PPS"),
        }
        if let DecodeStatus::Error(code) = engine.decode(pps, &command) {
            tracing::warn!(channel, code, "Error decoding PPS");
        }
    }
}

fn trace_unit(channel: ChannelId, nal: &[u8]) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let Some(&header) = nal.first() else {
        return;
    };
    let nal_type = NalUnitType::from_header(header);
    match nal_type {
        t if t.is_sequence_parameter_set() => match SpsInfo::parse(nal) {
            Ok(info) => tracing::debug!(channel, sps_id = info.sps_id, code = %t, size = nal.len(), "SPS"),
            Err(err) => tracing::debug!(channel, error = %err, "Unreadable SPS"),
        },
        NalUnitType::Pps => match PpsInfo::parse(nal) {
            Ok(info) => tracing::debug!(
                channel,
                pps_id = info.pps_id,
                sps_id = info.sps_id,
                size = nal.len(),
                "PPS"
            ),
            Err(err) => tracing::debug!(channel, error = %err, "Unreadable PPS"),
        },
        NalUnitType::Vdrd => tracing::debug!(channel, "VDRD found"),
        t => tracing::debug!(channel, code = %t, size = nal.len(), "NAL unit"),
    }
}
