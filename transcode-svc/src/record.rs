//! Decoder configuration record and parameter set inspection.
//!
//! Only what the adapter needs is extracted: the NAL length field size that
//! drives framing, the parameter set lists that are fed to the engine on
//! attach, and the picture size and sample aspect ratio of the first SPS.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::bitstream::{strip_emulation_prevention, BitReader};
use crate::error::{BitstreamError, Result, SvcError};
use crate::nal::NalUnitType;
use crate::output::PixelAspectRatio;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of a raw configuration record, used to detect reconfiguration.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Parsed AVC/SVC decoder configuration record (ISO/IEC 14496-15).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfigRecord {
    /// AVC profile indication.
    pub profile_idc: u8,
    /// Profile compatibility flags.
    pub profile_compatibility: u8,
    /// AVC level indication.
    pub level_idc: u8,
    /// Size in bytes of the NAL unit length field.
    pub nal_length_size: u8,
    /// Sequence parameter sets, NAL header included.
    pub sequence_parameter_sets: Vec<Vec<u8>>,
    /// Picture parameter sets, NAL header included.
    pub picture_parameter_sets: Vec<Vec<u8>>,
}

impl DecoderConfigRecord {
    /// Parse a configuration record.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let truncated = |_| SvcError::malformed("truncated configuration record");

        let version = cursor.read_u8().map_err(truncated)?;
        if version != 1 {
            return Err(SvcError::malformed(format!(
                "unsupported configuration version {}",
                version
            )));
        }
        let profile_idc = cursor.read_u8().map_err(truncated)?;
        let profile_compatibility = cursor.read_u8().map_err(truncated)?;
        let level_idc = cursor.read_u8().map_err(truncated)?;
        let nal_length_size = (cursor.read_u8().map_err(truncated)? & 0x03) + 1;

        let sps_count = cursor.read_u8().map_err(truncated)? & 0x1F;
        let sequence_parameter_sets = read_parameter_sets(&mut cursor, usize::from(sps_count))?;
        let pps_count = cursor.read_u8().map_err(truncated)?;
        let picture_parameter_sets = read_parameter_sets(&mut cursor, usize::from(pps_count))?;

        Ok(Self {
            profile_idc,
            profile_compatibility,
            level_idc,
            nal_length_size,
            sequence_parameter_sets,
            picture_parameter_sets,
        })
    }

    /// All parameter sets in feeding order: SPS first, then PPS.
    pub fn parameter_sets(&self) -> impl Iterator<Item = &[u8]> {
        self.sequence_parameter_sets
            .iter()
            .chain(self.picture_parameter_sets.iter())
            .map(Vec::as_slice)
    }
}

fn read_parameter_sets(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<Vec<u8>>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| SvcError::malformed("truncated parameter set length"))?;
        let mut set = vec![0u8; usize::from(len)];
        cursor
            .read_exact(&mut set)
            .map_err(|_| SvcError::malformed("truncated parameter set"))?;
        if set.is_empty() {
            return Err(SvcError::malformed("empty parameter set"));
        }
        sets.push(set);
    }
    Ok(sets)
}

/// Picture-level fields of a sequence parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsInfo {
    pub sps_id: u32,
    pub width: u32,
    pub height: u32,
    /// Sample aspect ratio from the VUI, when signalled.
    pub pixel_aspect: Option<PixelAspectRatio>,
}

/// Sample aspect ratios for `aspect_ratio_idc` 1..=16 (H.264 Table E-1).
const SAR_TABLE: [(u32, u32); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

const EXTENDED_SAR: u32 = 255;

fn has_chroma_info(profile_idc: u32) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

impl SpsInfo {
    /// Inspect an SPS or subset SPS NAL unit (header byte included).
    pub fn parse(unit: &[u8]) -> Result<Self> {
        let (&header, payload) = unit
            .split_first()
            .ok_or(SvcError::Bitstream(BitstreamError::UnexpectedEnd))?;
        let nal_type = NalUnitType::from_header(header);
        if !nal_type.is_sequence_parameter_set() {
            return Err(BitstreamError::InvalidSyntax {
                element: "nal_unit_type",
                value: i64::from(nal_type.to_u8()),
            }
            .into());
        }
        let rbsp = strip_emulation_prevention(payload);
        let mut r = BitReader::new(&rbsp);

        let profile_idc = r.read_bits(8)?;
        r.skip(16)?; // constraint flags, level_idc
        let sps_id = r.read_ue()?;
        if sps_id > 31 {
            return Err(BitstreamError::InvalidSyntax {
                element: "seq_parameter_set_id",
                value: i64::from(sps_id),
            }
            .into());
        }

        let mut chroma_format_idc = 1;
        let mut separate_colour_plane = false;
        if has_chroma_info(profile_idc) {
            chroma_format_idc = r.read_ue()?;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_bit()?;
            }
            r.read_ue()?; // bit_depth_luma_minus8
            r.read_ue()?; // bit_depth_chroma_minus8
            r.skip(1)?; // qpprime_y_zero_transform_bypass_flag
            if r.read_bit()? {
                let lists = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..lists {
                    if r.read_bit()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        r.read_ue()?; // log2_max_frame_num_minus4
        match r.read_ue()? {
            0 => {
                r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                r.skip(1)?;
                r.read_se()?;
                r.read_se()?;
                let cycle = r.read_ue()?;
                if cycle > 255 {
                    return Err(BitstreamError::InvalidSyntax {
                        element: "num_ref_frames_in_pic_order_cnt_cycle",
                        value: i64::from(cycle),
                    }
                    .into());
                }
                for _ in 0..cycle {
                    r.read_se()?;
                }
            }
            _ => {}
        }
        r.read_ue()?; // max_num_ref_frames
        r.skip(1)?; // gaps_in_frame_num_value_allowed_flag

        let width_mbs = r.read_ue()?.saturating_add(1);
        let height_map_units = r.read_ue()?.saturating_add(1);
        let frame_mbs_only = r.read_bit()?;
        if !frame_mbs_only {
            r.skip(1)?; // mb_adaptive_frame_field_flag
        }
        r.skip(1)?; // direct_8x8_inference_flag

        let field_factor = if frame_mbs_only { 1 } else { 2 };
        let mut width = width_mbs.saturating_mul(16);
        let mut height = height_map_units.saturating_mul(16).saturating_mul(field_factor);

        if r.read_bit()? {
            let (left, right, top, bottom) = (r.read_ue()?, r.read_ue()?, r.read_ue()?, r.read_ue()?);
            let (crop_x, crop_y) = if chroma_format_idc == 0 || separate_colour_plane {
                (1, field_factor)
            } else {
                let sub_width = if chroma_format_idc == 3 { 1 } else { 2 };
                let sub_height = if chroma_format_idc == 1 { 2 } else { 1 };
                (sub_width, sub_height * field_factor)
            };
            width = width.saturating_sub(left.saturating_add(right).saturating_mul(crop_x));
            height = height.saturating_sub(top.saturating_add(bottom).saturating_mul(crop_y));
        }

        let mut pixel_aspect = None;
        if r.read_bit()? && r.read_bit()? {
            let idc = r.read_bits(8)?;
            pixel_aspect = match idc {
                EXTENDED_SAR => {
                    let num = r.read_bits(16)?;
                    let den = r.read_bits(16)?;
                    PixelAspectRatio::new(num, den)
                }
                1..=16 => {
                    let (num, den) = SAR_TABLE[idc as usize - 1];
                    PixelAspectRatio::new(num, den)
                }
                _ => None,
            };
        }

        Ok(Self {
            sps_id,
            width,
            height,
            pixel_aspect,
        })
    }
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = r.read_se()?;
            if !(-128..=127).contains(&delta) {
                return Err(BitstreamError::InvalidSyntax {
                    element: "delta_scale",
                    value: i64::from(delta),
                }
                .into());
            }
            next = (last + delta + 256).rem_euclid(256);
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

/// Identifiers of a picture parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpsInfo {
    pub pps_id: u32,
    pub sps_id: u32,
}

impl PpsInfo {
    /// Inspect a PPS NAL unit (header byte included).
    pub fn parse(unit: &[u8]) -> Result<Self> {
        let payload = unit
            .get(1..)
            .ok_or(SvcError::Bitstream(BitstreamError::UnexpectedEnd))?;
        let rbsp = strip_emulation_prevention(payload);
        let mut r = BitReader::new(&rbsp);
        let pps_id = r.read_ue()?;
        let sps_id = r.read_ue()?;
        Ok(Self { pps_id, sps_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Baseline SPS, 320x240, no VUI.
    const SPS_320X240: [u8; 8] = [0x67, 0x42, 0x00, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
    /// Same SPS with VUI aspect_ratio_idc = 2 (12:11).
    const SPS_320X240_SAR: [u8; 9] = [0x67, 0x42, 0x00, 0x1E, 0xF4, 0x0A, 0x0F, 0xD8, 0x10];
    const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

    fn record(length_size: u8, sps: &[u8], pps: &[u8]) -> Vec<u8> {
        let mut data = vec![0x01, 0x42, 0x00, 0x1E, 0xFC | (length_size - 1), 0xE1];
        data.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        data.extend_from_slice(sps);
        data.push(0x01);
        data.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        data.extend_from_slice(pps);
        data
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
        let a = record(4, &SPS_320X240, &PPS);
        let b = record(4, &SPS_320X240_SAR, &PPS);
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_record_parse() {
        let cfg = DecoderConfigRecord::parse(&record(3, &SPS_320X240, &PPS)).unwrap();
        assert_eq!(cfg.profile_idc, 66);
        assert_eq!(cfg.level_idc, 30);
        assert_eq!(cfg.nal_length_size, 3);
        assert_eq!(cfg.sequence_parameter_sets, vec![SPS_320X240.to_vec()]);
        assert_eq!(cfg.picture_parameter_sets, vec![PPS.to_vec()]);
        assert_eq!(cfg.parameter_sets().count(), 2);
    }

    #[test]
    fn test_record_rejects_bad_version() {
        let mut data = record(4, &SPS_320X240, &PPS);
        data[0] = 2;
        assert!(matches!(
            DecoderConfigRecord::parse(&data),
            Err(SvcError::MalformedConfiguration(_))
        ));
    }

    #[test]
    fn test_record_rejects_truncation() {
        let data = record(4, &SPS_320X240, &PPS);
        for len in [0, 3, 6, 9, data.len() - 1] {
            assert!(
                DecoderConfigRecord::parse(&data[..len]).is_err(),
                "length {} should be rejected",
                len
            );
        }
    }

    #[test]
    fn test_sps_info() {
        let info = SpsInfo::parse(&SPS_320X240).unwrap();
        assert_eq!(info.sps_id, 0);
        assert_eq!(info.width, 320);
        assert_eq!(info.height, 240);
        assert_eq!(info.pixel_aspect, None);
    }

    #[test]
    fn test_sps_info_aspect_ratio() {
        let info = SpsInfo::parse(&SPS_320X240_SAR).unwrap();
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(info.pixel_aspect, PixelAspectRatio::new(12, 11));
    }

    #[test]
    fn test_sps_info_rejects_other_types() {
        assert!(SpsInfo::parse(&PPS).is_err());
        assert!(SpsInfo::parse(&[]).is_err());
        assert!(SpsInfo::parse(&SPS_320X240[..5]).is_err());
    }

    #[test]
    fn test_sps_rejects_out_of_range_delta_scale() {
        // High profile, scaling matrix present, first list delta_scale = 200
        let sps = [0x67, 0x64, 0x00, 0x1E, 0xAD, 0x80, 0x64, 0x20];
        assert!(matches!(
            SpsInfo::parse(&sps),
            Err(SvcError::Bitstream(BitstreamError::InvalidSyntax {
                element: "delta_scale",
                value: 200
            }))
        ));

        // delta_scale = i32::MAX must not overflow
        let sps = [
            0x67, 0x64, 0x00, 0x1E, 0xAD, 0x80, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFE, 0x80,
        ];
        assert!(matches!(
            SpsInfo::parse(&sps),
            Err(SvcError::Bitstream(BitstreamError::InvalidSyntax {
                element: "delta_scale",
                value: 2147483647
            }))
        ));
        assert!(DecoderConfigRecord::parse(&record(4, &sps, &PPS)).is_ok());
    }

    #[test]
    fn test_pps_info() {
        let info = PpsInfo::parse(&PPS).unwrap();
        assert_eq!(info, PpsInfo { pps_id: 0, sps_id: 0 });
    }
}
