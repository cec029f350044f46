//! H.264/SVC NAL unit classification.
//!
//! Scalable layers are signalled through the 3-byte NAL header extension
//! carried by prefix units (type 14) and coded slice extensions (type 20).
//! The dependency and quality ids in that extension combine into the DQ id
//! the quality controller works with.

use std::fmt;

/// Largest DQ id representable (dependency_id 7, quality_id 15).
pub const MAX_DQ_ID: u8 = (7 << 4) | 15;

/// NAL unit type (H.264 Annex A/G subset relevant to layered decoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Non-IDR slice.
    Slice,
    /// IDR slice.
    IdrSlice,
    /// Supplemental enhancement information.
    Sei,
    /// Sequence parameter set.
    Sps,
    /// Picture parameter set.
    Pps,
    /// Access unit delimiter.
    Aud,
    /// Prefix NAL unit (SVC header for the following base-layer slice).
    Prefix,
    /// Subset sequence parameter set.
    SubsetSps,
    /// Coded slice extension (SVC/MVC).
    SliceExtension,
    /// View and dependency representation delimiter.
    Vdrd,
    /// Any other type.
    Other(u8),
}

impl NalUnitType {
    /// Classify the first byte of a NAL unit.
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            14 => Self::Prefix,
            15 => Self::SubsetSps,
            20 => Self::SliceExtension,
            24 => Self::Vdrd,
            n => Self::Other(n),
        }
    }

    /// Raw 5-bit type value.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::IdrSlice => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::Prefix => 14,
            Self::SubsetSps => 15,
            Self::SliceExtension => 20,
            Self::Vdrd => 24,
            Self::Other(n) => n,
        }
    }

    /// Sequence parameter set, plain or subset.
    pub fn is_sequence_parameter_set(self) -> bool {
        matches!(self, Self::Sps | Self::SubsetSps)
    }

    /// Carries the SVC header extension.
    pub fn has_svc_extension(self) -> bool {
        matches!(self, Self::Prefix | Self::SliceExtension)
    }

    /// Coded picture data of the base layer.
    pub fn is_base_slice(self) -> bool {
        matches!(self, Self::Slice | Self::IdrSlice)
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slice => write!(f, "slice"),
            Self::IdrSlice => write!(f, "idr"),
            Self::Sei => write!(f, "sei"),
            Self::Sps => write!(f, "sps"),
            Self::Pps => write!(f, "pps"),
            Self::Aud => write!(f, "aud"),
            Self::Prefix => write!(f, "prefix"),
            Self::SubsetSps => write!(f, "subset-sps"),
            Self::SliceExtension => write!(f, "slice-ext"),
            Self::Vdrd => write!(f, "vdrd"),
            Self::Other(n) => write!(f, "type-{}", n),
        }
    }
}

/// SVC NAL unit header extension (H.264 G.7.3.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvcExtension {
    pub idr: bool,
    pub priority_id: u8,
    pub no_inter_layer_pred: bool,
    pub dependency_id: u8,
    pub quality_id: u8,
    pub temporal_id: u8,
    pub use_ref_base_pic: bool,
    pub discardable: bool,
    pub output: bool,
}

impl SvcExtension {
    /// Parse the extension from a complete NAL unit (header byte included).
    ///
    /// Returns `None` for units without an extension, for MVC extensions
    /// (`svc_extension_flag` clear) and for truncated units.
    pub fn parse(unit: &[u8]) -> Option<Self> {
        let (&header, rest) = unit.split_first()?;
        if !NalUnitType::from_header(header).has_svc_extension() || rest.len() < 3 {
            return None;
        }
        let (b0, b1, b2) = (rest[0], rest[1], rest[2]);
        if b0 & 0x80 == 0 {
            return None;
        }
        Some(Self {
            idr: b0 & 0x40 != 0,
            priority_id: b0 & 0x3F,
            no_inter_layer_pred: b1 & 0x80 != 0,
            dependency_id: (b1 >> 4) & 0x07,
            quality_id: b1 & 0x0F,
            temporal_id: b2 >> 5,
            use_ref_base_pic: b2 & 0x10 != 0,
            discardable: b2 & 0x08 != 0,
            output: b2 & 0x04 != 0,
        })
    }

    /// Combined dependency/quality id.
    pub fn dq_id(&self) -> u8 {
        (self.dependency_id << 4) | self.quality_id
    }
}

/// DQ id of a single unit: the extension's id, or 0 for base-layer data.
pub fn unit_dq_id(unit: &[u8]) -> u8 {
    SvcExtension::parse(unit).map_or(0, |ext| ext.dq_id())
}

/// Layer ids found while scanning one access unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DqScan {
    /// Highest DQ id in the access unit.
    pub max_dq_id: u8,
    /// Distinct DQ ids, ascending.
    pub present: Vec<u8>,
}

impl DqScan {
    /// Scan a sequence of units.
    pub fn scan<'a>(units: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut scan = Self::default();
        for unit in units {
            let Some(&header) = unit.first() else {
                continue;
            };
            let nal_type = NalUnitType::from_header(header);
            if !nal_type.has_svc_extension() && !nal_type.is_base_slice() {
                continue;
            }
            let dq = unit_dq_id(unit);
            scan.max_dq_id = scan.max_dq_id.max(dq);
            if let Err(pos) = scan.present.binary_search(&dq) {
                scan.present.insert(pos, dq);
            }
        }
        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_unit_type() {
        assert_eq!(NalUnitType::from_header(0x67), NalUnitType::Sps);
        assert_eq!(NalUnitType::from_header(0x68), NalUnitType::Pps);
        assert_eq!(NalUnitType::from_header(0x65), NalUnitType::IdrSlice);
        assert_eq!(NalUnitType::from_header(0x6E), NalUnitType::Prefix);
        assert_eq!(NalUnitType::from_header(0x6F), NalUnitType::SubsetSps);
        assert_eq!(NalUnitType::from_header(0x74), NalUnitType::SliceExtension);
        assert_eq!(NalUnitType::from_header(0x1F), NalUnitType::Other(31));
        assert_eq!(NalUnitType::Other(31).to_u8(), 31);
        assert!(NalUnitType::SubsetSps.is_sequence_parameter_set());
        assert!(!NalUnitType::Pps.is_sequence_parameter_set());
    }

    #[test]
    fn test_svc_extension_parse() {
        // slice extension, idr, priority 5 | dependency 2, quality 3 | temporal 4, output
        let unit = [0x74, 0b1100_0101, 0b0010_0011, 0b1000_0100, 0xAA];
        let ext = SvcExtension::parse(&unit).unwrap();
        assert!(ext.idr);
        assert_eq!(ext.priority_id, 5);
        assert!(!ext.no_inter_layer_pred);
        assert_eq!(ext.dependency_id, 2);
        assert_eq!(ext.quality_id, 3);
        assert_eq!(ext.temporal_id, 4);
        assert!(ext.output);
        assert!(!ext.discardable);
        assert_eq!(ext.dq_id(), 0x23);
    }

    #[test]
    fn test_svc_extension_rejects_mvc_and_truncated() {
        assert!(SvcExtension::parse(&[0x74, 0x00, 0x10, 0x00]).is_none());
        assert!(SvcExtension::parse(&[0x74, 0x80]).is_none());
        assert!(SvcExtension::parse(&[0x65, 0x80, 0x10, 0x00]).is_none());
        assert!(SvcExtension::parse(&[]).is_none());
    }

    #[test]
    fn test_dq_scan() {
        let idr: &[u8] = &[0x65, 0x88];
        let sps: &[u8] = &[0x67, 0x42];
        let layer_1: &[u8] = &[0x74, 0x80, 0x10, 0x00, 0x00];
        let layer_2: &[u8] = &[0x74, 0x80, 0x20, 0x00, 0x00];
        let scan = DqScan::scan([sps, idr, layer_2, layer_1, layer_2]);
        assert_eq!(scan.max_dq_id, 0x20);
        assert_eq!(scan.present, vec![0x00, 0x10, 0x20]);
    }

    #[test]
    fn test_dq_scan_ignores_parameter_sets() {
        let sps: &[u8] = &[0x67, 0x42];
        let scan = DqScan::scan([sps]);
        assert_eq!(scan, DqScan::default());
    }
}
