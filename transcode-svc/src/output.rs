//! Output picture assembly.
//!
//! Engine pictures come out with a `width + padding` row stride and three
//! separate planes. The assembler packs them into one planar 4:2:0 buffer,
//! stamps the buffer with the queued frame info and keeps the host informed of
//! geometry changes.

use std::fmt;

use bitflags::bitflags;

use crate::engine::DecodedPicture;
use crate::frame_info::{FrameInfo, FrameInfoQueue};
use crate::host::{OutputPicture, OutputSink};

/// Sample (pixel) aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelAspectRatio {
    pub num: u32,
    pub den: u32,
}

impl PixelAspectRatio {
    /// Square pixels.
    pub const SQUARE: Self = Self { num: 1, den: 1 };

    /// Create a ratio; `None` when either term is zero.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        (num > 0 && den > 0).then_some(Self { num, den })
    }
}

impl fmt::Display for PixelAspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

/// Output pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Planar Y, U, V with 2x2 chroma subsampling.
    #[default]
    Yuv420p,
}

bitflags! {
    /// Output properties that changed in a geometry notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeometryChange: u8 {
        const WIDTH = 0x01;
        const HEIGHT = 0x02;
        const STRIDE = 0x04;
        const PIXEL_ASPECT = 0x08;
        const PIXEL_FORMAT = 0x10;
    }
}

/// Dimensions and layout of output pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputGeometry {
    pub width: u32,
    pub height: u32,
    /// Luma row stride in bytes.
    pub stride: u32,
    pub pixel_aspect: Option<PixelAspectRatio>,
    pub pixel_format: PixelFormat,
}

impl OutputGeometry {
    /// Geometry for a `width` x `height` picture with `padding` extra bytes
    /// per row.
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            stride: width.saturating_add(padding),
            pixel_aspect: None,
            pixel_format: PixelFormat::Yuv420p,
        }
    }

    /// Set the pixel aspect ratio.
    pub fn with_pixel_aspect(mut self, par: Option<PixelAspectRatio>) -> Self {
        self.pixel_aspect = par;
        self
    }

    /// Luma plane size in bytes, saturating.
    pub fn luma_size(&self) -> usize {
        (self.stride as usize).saturating_mul(self.height as usize)
    }

    /// Size of each chroma plane in bytes.
    pub fn chroma_size(&self) -> usize {
        self.luma_size() / 4
    }

    /// Output buffer size in bytes, saturating.
    pub fn size(&self) -> usize {
        self.luma_size().saturating_mul(3) / 2
    }

    /// Output buffer size, `None` when it cannot be allocated.
    pub fn checked_size(&self) -> Option<usize> {
        (self.stride as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(3)
            .map(|n| n / 2)
            .filter(|&n| n <= isize::MAX as usize)
    }

    /// Properties that differ between `self` and `other`.
    pub fn diff(&self, other: &Self) -> GeometryChange {
        let mut changed = GeometryChange::empty();
        changed.set(GeometryChange::WIDTH, self.width != other.width);
        changed.set(GeometryChange::HEIGHT, self.height != other.height);
        changed.set(GeometryChange::STRIDE, self.stride != other.stride);
        changed.set(
            GeometryChange::PIXEL_ASPECT,
            self.pixel_aspect != other.pixel_aspect,
        );
        changed.set(
            GeometryChange::PIXEL_FORMAT,
            self.pixel_format != other.pixel_format,
        );
        changed
    }
}

/// What happened to a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembled {
    /// Delivered to the sink.
    Emitted(FrameInfo),
    /// Decoded for a seek and dropped.
    Suppressed(FrameInfo),
    /// No frame info was queued for it; dropped.
    Missing,
    /// The engine reported a size no buffer can hold; dropped.
    Rejected(FrameInfo),
}

/// Turns engine pictures into output pictures.
#[derive(Debug, Clone)]
pub struct OutputAssembler {
    geometry: OutputGeometry,
    padding: u32,
    announce_pending: bool,
}

impl OutputAssembler {
    pub fn new(padding: u32) -> Self {
        Self {
            geometry: OutputGeometry::new(0, 0, padding),
            padding,
            announce_pending: false,
        }
    }

    /// Current output geometry.
    pub fn geometry(&self) -> &OutputGeometry {
        &self.geometry
    }

    /// Enlarge the configured size from a sequence parameter set.
    ///
    /// The size only ever grows; the aspect ratio is taken along with a
    /// larger size when the parameter set signals one.
    pub fn grow_to(&mut self, width: u32, height: u32, par: Option<PixelAspectRatio>) {
        if self.geometry.width < width || self.geometry.height < height {
            self.geometry.width = width;
            self.geometry.height = height;
            self.geometry.stride = width.saturating_add(self.padding);
            if par.is_some() {
                self.geometry.pixel_aspect = par;
            }
        }
    }

    /// Override the pixel aspect ratio.
    pub fn set_pixel_aspect(&mut self, par: PixelAspectRatio) {
        self.geometry.pixel_aspect = Some(par);
    }

    /// Announce the configured geometry with the next picture.
    pub fn mark_configured(&mut self) {
        self.announce_pending = true;
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.geometry = OutputGeometry::new(0, 0, self.padding);
        self.announce_pending = false;
    }

    /// Handle one engine picture.
    ///
    /// Geometry updates reach the sink before the picture they apply to.
    /// Exactly one frame info is popped unless the queue is empty.
    pub fn assemble<S: OutputSink + ?Sized>(
        &mut self,
        picture: &DecodedPicture,
        queue: &mut FrameInfoQueue,
        sink: &mut S,
    ) -> Assembled {
        let reported = OutputGeometry::new(picture.width, picture.height, self.padding);
        if reported.checked_size().is_none() {
            tracing::warn!(
                width = picture.width,
                height = picture.height,
                "Dropping picture with unusable size"
            );
            return match queue.pop_front() {
                Some(info) => Assembled::Rejected(info),
                None => Assembled::Missing,
            };
        }

        let mut changed = GeometryChange::empty();
        if picture.width != self.geometry.width || picture.height != self.geometry.height {
            tracing::info!(
                "Resizing from {}x{} to {}x{}",
                self.geometry.width,
                self.geometry.height,
                picture.width,
                picture.height
            );
            let next = reported.with_pixel_aspect(self.geometry.pixel_aspect);
            changed = self.geometry.diff(&next);
            self.geometry = next;
        }
        if self.announce_pending {
            changed = GeometryChange::all();
            self.announce_pending = false;
        }
        if !changed.is_empty() {
            sink.geometry_changed(&self.geometry, changed);
        }

        let Some(info) = queue.pop_front() else {
            return Assembled::Missing;
        };
        if info.seek {
            tracing::trace!(pts = info.pts, "Dropping seek picture");
            return Assembled::Suppressed(info);
        }

        let data = self.pack(picture);
        tracing::debug!(pts = info.pts, "Decoded output frame");
        sink.deliver(OutputPicture {
            pts: info.pts,
            duration: info.duration,
            sap: info.sap,
            data,
        });
        Assembled::Emitted(info)
    }

    fn pack(&self, picture: &DecodedPicture) -> Vec<u8> {
        let luma = self.geometry.luma_size();
        let chroma = self.geometry.chroma_size();
        let mut data = Vec::with_capacity(self.geometry.size());
        copy_plane(&mut data, &picture.y, luma);
        copy_plane(&mut data, &picture.u, chroma);
        copy_plane(&mut data, &picture.v, chroma);
        data.resize(self.geometry.size(), 0);
        data
    }
}

/// Append exactly `len` bytes of `plane`, zero-filling when it is short.
fn copy_plane(out: &mut Vec<u8>, plane: &[u8], len: usize) {
    let available = len.min(plane.len());
    out.extend_from_slice(&plane[..available]);
    if available < len {
        tracing::trace!(expected = len, available, "Short plane");
        out.resize(out.len() + len - available, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_info::SapType;
    use crate::host::{OutputEvent, OutputQueue};

    fn picture(width: u32, height: u32) -> DecodedPicture {
        let stride = (width + 32) as usize;
        let luma = stride * height as usize;
        DecodedPicture {
            width,
            height,
            y: vec![0x10; luma],
            u: vec![0x80; luma / 4],
            v: vec![0x90; luma / 4],
        }
    }

    fn queue_with(pts: u64, seek: bool) -> FrameInfoQueue {
        let mut queue = FrameInfoQueue::new(10);
        queue.push_if_new(FrameInfo {
            pts,
            duration: 40,
            sap: SapType::Type1,
            seek,
        });
        queue
    }

    #[test]
    fn test_geometry_size() {
        let geometry = OutputGeometry::new(320, 240, 32);
        assert_eq!(geometry.stride, 352);
        assert_eq!(geometry.luma_size(), 352 * 240);
        assert_eq!(geometry.size(), 352 * 240 * 3 / 2);
    }

    #[test]
    fn test_geometry_size_overflow() {
        let huge = OutputGeometry::new(u32::MAX, u32::MAX, 32);
        assert_eq!(huge.checked_size(), None);
        assert_eq!(huge.luma_size(), (u32::MAX as usize).saturating_mul(u32::MAX as usize));
        assert!(huge.size() > 0);
        assert_eq!(
            OutputGeometry::new(320, 240, 32).checked_size(),
            Some(352 * 240 * 3 / 2)
        );
    }

    #[test]
    fn test_geometry_diff() {
        let a = OutputGeometry::new(320, 240, 32);
        let b = OutputGeometry::new(640, 240, 32);
        assert_eq!(a.diff(&b), GeometryChange::WIDTH | GeometryChange::STRIDE);
        assert!(a.diff(&a).is_empty());
        let c = a.with_pixel_aspect(PixelAspectRatio::new(4, 3));
        assert_eq!(a.diff(&c), GeometryChange::PIXEL_ASPECT);
    }

    #[test]
    fn test_pixel_aspect() {
        assert_eq!(PixelAspectRatio::new(0, 1), None);
        assert_eq!(PixelAspectRatio::new(1, 1), Some(PixelAspectRatio::SQUARE));
        assert_eq!(PixelAspectRatio::SQUARE.to_string(), "1:1");
    }

    #[test]
    fn test_emit_packs_planes() {
        let mut assembler = OutputAssembler::new(32);
        assembler.grow_to(16, 16, None);
        assembler.mark_configured();
        let mut queue = queue_with(1000, false);
        let mut sink = OutputQueue::new();

        let result = assembler.assemble(&picture(16, 16), &mut queue, &mut sink);
        assert!(matches!(result, Assembled::Emitted(info) if info.pts == 1000));
        assert!(queue.is_empty());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            OutputEvent::Geometry { changed, .. } if *changed == GeometryChange::all()
        ));
        let OutputEvent::Picture(out) = &events[1] else {
            panic!("expected picture");
        };
        let luma = 48 * 16;
        assert_eq!(out.data.len(), luma * 3 / 2);
        assert_eq!(out.data[0], 0x10);
        assert_eq!(out.data[luma], 0x80);
        assert_eq!(out.data[luma + luma / 4], 0x90);
        assert_eq!(out.sap, SapType::Type1);
        assert_eq!(out.duration, 40);
    }

    #[test]
    fn test_seek_picture_is_suppressed() {
        let mut assembler = OutputAssembler::new(32);
        assembler.grow_to(16, 16, None);
        let mut queue = queue_with(0, true);
        let mut sink = OutputQueue::new();

        let result = assembler.assemble(&picture(16, 16), &mut queue, &mut sink);
        assert!(matches!(result, Assembled::Suppressed(_)));
        assert!(queue.is_empty());
        assert_eq!(sink.pictures().count(), 0);
    }

    #[test]
    fn test_resize_notifies_before_picture() {
        let mut assembler = OutputAssembler::new(32);
        assembler.grow_to(16, 16, None);
        let mut sink = OutputQueue::new();

        let mut queue = queue_with(0, false);
        assembler.assemble(&picture(16, 16), &mut queue, &mut sink);
        assert_eq!(sink.geometry_updates(), 0);

        let mut queue = queue_with(40, false);
        assembler.assemble(&picture(32, 16), &mut queue, &mut sink);
        let events = sink.events();
        assert_eq!(sink.geometry_updates(), 1);
        assert!(matches!(
            &events[1],
            OutputEvent::Geometry { geometry, changed }
                if geometry.width == 32
                    && *changed == GeometryChange::WIDTH | GeometryChange::STRIDE
        ));
        assert!(matches!(&events[2], OutputEvent::Picture(p) if p.pts == 40));
    }

    #[test]
    fn test_short_planes_are_zero_padded() {
        let mut assembler = OutputAssembler::new(32);
        assembler.grow_to(16, 16, None);
        let mut queue = queue_with(0, false);
        let mut sink = OutputQueue::new();
        let short = DecodedPicture {
            width: 16,
            height: 16,
            y: vec![0xFF; 4],
            u: Vec::new(),
            v: Vec::new(),
        };

        assembler.assemble(&short, &mut queue, &mut sink);
        let out = sink.pictures().next().unwrap();
        assert_eq!(out.data.len(), 48 * 16 * 3 / 2);
        assert_eq!(&out.data[..5], &[0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    }

    #[test]
    fn test_missing_frame_info() {
        let mut assembler = OutputAssembler::new(32);
        let mut queue = FrameInfoQueue::new(10);
        let mut sink = OutputQueue::new();
        let result = assembler.assemble(&picture(16, 16), &mut queue, &mut sink);
        assert_eq!(result, Assembled::Missing);
        assert_eq!(sink.pictures().count(), 0);
    }

    #[test]
    fn test_geometry_only_grows() {
        let mut assembler = OutputAssembler::new(32);
        assembler.grow_to(320, 240, PixelAspectRatio::new(12, 11));
        assembler.grow_to(176, 144, PixelAspectRatio::new(1, 1));
        assembler.mark_configured();
        let geometry = assembler.geometry();
        assert_eq!((geometry.width, geometry.height, geometry.stride), (320, 240, 352));
        assert_eq!(geometry.pixel_aspect, PixelAspectRatio::new(12, 11));
    }
}
