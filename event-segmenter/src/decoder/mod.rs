//! Translation of raw file bytes into physical current values.
//!
//! A [`DataFormat`] names the layout of a file family. Supported formats
//! produce a [`LinearDecoder`], which interprets one element of a record and
//! applies `raw * scale + offset`.
pub mod binary;
pub mod chimera;
pub mod sample_type;

pub use binary::{BinaryDecoderConfig, BinaryLayout};
pub use chimera::{CHIMERA_SAMPLE_BYTES, ChimeraSetup, default_settings_path};
pub use sample_type::{ByteOrder, SampleType};

use crate::error::{SegmentError, SegmentResult};
use nanoseg_common::Real;
use std::str::FromStr;

/// Converts one record of raw bytes into a physical value.
pub trait SampleDecoder {
    fn record_width(&self) -> usize;

    /// `record` must hold at least `record_width()` bytes.
    fn decode(&self, record: &[u8]) -> Option<Real>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecoder {
    pub(crate) sample_type: SampleType,
    pub(crate) byte_order: ByteOrder,
    pub(crate) element_offset: usize,
    pub(crate) record_width: usize,
    pub(crate) scale: Real,
    pub(crate) offset: Real,
}

impl LinearDecoder {
    pub fn scale(&self) -> Real {
        self.scale
    }

    pub fn offset(&self) -> Real {
        self.offset
    }
}

impl SampleDecoder for LinearDecoder {
    fn record_width(&self) -> usize {
        self.record_width
    }

    fn decode(&self, record: &[u8]) -> Option<Real> {
        let element = record.get(self.element_offset..)?;
        let raw = self.sample_type.interpret(element, self.byte_order)?;
        Some(raw * self.scale + self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::FromRepr)]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum FormatTag {
    Chimera = 0,
    Binary = 1,
    IgorOpt = 2,
    EoneDat = 3,
}

impl FormatTag {
    /// Accepts a format name or one of the legacy numeric tags.
    pub fn parse(tag: &str) -> SegmentResult<Self> {
        let tag = tag.trim();
        FormatTag::from_str(tag)
            .ok()
            .or_else(|| tag.parse::<u8>().ok().and_then(FormatTag::from_repr))
            .ok_or_else(|| SegmentError::UnsupportedFormat(tag.to_owned()))
    }
}

/// The file families a virtual channel can be built from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataFormat {
    /// Native 16 bit unsigned samples with per-file acquisition settings.
    Chimera,
    Binary(BinaryDecoderConfig),
    /// Reserved.
    IgorOpt,
    /// Reserved.
    EoneDat,
}

impl DataFormat {
    /// `layout` is required for, and only used by, [`FormatTag::Binary`].
    pub fn from_tag(tag: FormatTag, layout: Option<BinaryDecoderConfig>) -> SegmentResult<Self> {
        match (tag, layout) {
            (FormatTag::Chimera, _) => Ok(DataFormat::Chimera),
            (FormatTag::Binary, Some(config)) => Ok(DataFormat::Binary(config)),
            (FormatTag::Binary, None) => Err(SegmentError::InvalidDecoder(
                "binary format requires a layout".into(),
            )),
            (FormatTag::IgorOpt, _) => Ok(DataFormat::IgorOpt),
            (FormatTag::EoneDat, _) => Ok(DataFormat::EoneDat),
        }
    }

    pub fn tag(&self) -> FormatTag {
        match self {
            DataFormat::Chimera => FormatTag::Chimera,
            DataFormat::Binary(_) => FormatTag::Binary,
            DataFormat::IgorOpt => FormatTag::IgorOpt,
            DataFormat::EoneDat => FormatTag::EoneDat,
        }
    }

    /// Fails for the reserved formats, which no reader implements.
    pub fn ensure_supported(&self) -> SegmentResult<()> {
        match self {
            DataFormat::Chimera | DataFormat::Binary(_) => Ok(()),
            DataFormat::IgorOpt | DataFormat::EoneDat => {
                Err(SegmentError::UnsupportedFormat(self.tag().to_string()))
            }
        }
    }

    pub fn record_width(&self) -> SegmentResult<usize> {
        match self {
            DataFormat::Chimera => Ok(CHIMERA_SAMPLE_BYTES),
            DataFormat::Binary(config) => Ok(config.record_width()),
            DataFormat::IgorOpt | DataFormat::EoneDat => self.ensure_supported().map(|_| 0),
        }
    }

    pub fn header_bytes(&self) -> SegmentResult<u64> {
        match self {
            DataFormat::Chimera => Ok(0),
            DataFormat::Binary(config) => Ok(config.header_bytes()),
            DataFormat::IgorOpt | DataFormat::EoneDat => self.ensure_supported().map(|_| 0),
        }
    }
}
