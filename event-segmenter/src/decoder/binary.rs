use super::{ByteOrder, LinearDecoder, SampleType};
use crate::error::{SegmentError, SegmentResult};
use nanoseg_common::{Real, SampleRate};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Serialised description of a generic binary layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BinaryLayout {
    #[serde(default)]
    pub header_bytes: u64,
    pub sample_rate: SampleRate,
    #[serde(default = "default_n_arrays")]
    pub n_arrays: usize,
    #[serde(default)]
    pub array_index: usize,
    pub sample_type: SampleType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default = "default_scale")]
    pub scale: Real,
    #[serde(default)]
    pub offset: Real,
}

fn default_n_arrays() -> usize {
    1
}

fn default_scale() -> Real {
    1.0
}

/// A validated generic binary layout.
///
/// Records are `n_arrays` interleaved elements of `sample_type`; this
/// config selects element `array_index` of every record.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDecoderConfig {
    layout: BinaryLayout,
}

impl BinaryDecoderConfig {
    pub fn new(layout: BinaryLayout) -> SegmentResult<Self> {
        let invalid = SegmentError::InvalidDecoder;
        if layout.n_arrays == 0 {
            return Err(invalid("a record must contain at least one array".into()));
        }
        if layout.array_index >= layout.n_arrays {
            return Err(invalid(format!(
                "array index {} is out of range for {} arrays",
                layout.array_index, layout.n_arrays
            )));
        }
        if !layout.scale.is_finite() || layout.scale == 0.0 {
            return Err(invalid(format!("scale must be finite and non-zero, got {}", layout.scale)));
        }
        if !layout.offset.is_finite() {
            return Err(invalid(format!("offset must be finite, got {}", layout.offset)));
        }
        if !layout.sample_rate.is_finite() || layout.sample_rate <= 0.0 {
            return Err(invalid(format!(
                "sample rate must be positive, got {}",
                layout.sample_rate
            )));
        }
        if layout.n_arrays.checked_mul(layout.sample_type.width()).is_none() {
            return Err(invalid(format!("{} arrays overflow the record width", layout.n_arrays)));
        }
        Ok(Self { layout })
    }

    pub fn from_json(text: &str) -> SegmentResult<Self> {
        Self::new(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> SegmentResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| SegmentError::FileRead {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// The same layout, reading a different array of each record.
    pub fn with_array_index(&self, array_index: usize) -> SegmentResult<Self> {
        Self::new(BinaryLayout {
            array_index,
            ..self.layout.clone()
        })
    }

    pub fn layout(&self) -> &BinaryLayout {
        &self.layout
    }

    pub fn header_bytes(&self) -> u64 {
        self.layout.header_bytes
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.layout.sample_rate
    }

    pub fn n_arrays(&self) -> usize {
        self.layout.n_arrays
    }

    pub fn array_index(&self) -> usize {
        self.layout.array_index
    }

    pub fn record_width(&self) -> usize {
        self.layout.n_arrays * self.layout.sample_type.width()
    }

    pub fn decoder(&self) -> LinearDecoder {
        LinearDecoder {
            sample_type: self.layout.sample_type,
            byte_order: self.layout.byte_order,
            element_offset: self.layout.array_index * self.layout.sample_type.width(),
            record_width: self.record_width(),
            scale: self.layout.scale,
            offset: self.layout.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SampleDecoder;

    fn layout() -> BinaryLayout {
        BinaryLayout {
            header_bytes: 0,
            sample_rate: 250_000.0,
            n_arrays: 1,
            array_index: 0,
            sample_type: SampleType::I32 { mask: None },
            byte_order: ByteOrder::Little,
            scale: 2.0,
            offset: -5.0,
        }
    }

    #[test]
    fn scale_and_offset() {
        let config = BinaryDecoderConfig::new(layout()).unwrap();
        let decoder = config.decoder();
        assert_eq!(decoder.decode(&100i32.to_le_bytes()), Some(195.0));
    }

    #[test]
    fn interleaved_arrays() {
        let config = BinaryDecoderConfig::new(BinaryLayout {
            n_arrays: 3,
            array_index: 2,
            sample_type: SampleType::U16 { mask: None },
            byte_order: ByteOrder::Big,
            scale: 1.0,
            offset: 0.0,
            ..layout()
        })
        .unwrap();
        assert_eq!(config.record_width(), 6);
        let record = [0, 1, 0, 2, 0, 3];
        assert_eq!(config.decoder().decode(&record), Some(3.0));
        let first = config.with_array_index(0).unwrap();
        assert_eq!(first.decoder().decode(&record), Some(1.0));
        assert!(config.with_array_index(3).is_err());
    }

    #[test]
    fn rejects_degenerate_layouts() {
        for bad in [
            BinaryLayout { scale: 0.0, ..layout() },
            BinaryLayout { scale: Real::NAN, ..layout() },
            BinaryLayout { n_arrays: 0, ..layout() },
            BinaryLayout { array_index: 1, ..layout() },
            BinaryLayout { sample_rate: 0.0, ..layout() },
        ] {
            assert!(matches!(
                BinaryDecoderConfig::new(bad),
                Err(SegmentError::InvalidDecoder(_))
            ));
        }
    }

    #[test]
    fn from_json_with_defaults() {
        let config = BinaryDecoderConfig::from_json(
            r#"{ "sample-rate": 1e6, "header-bytes": 16, "sample-type": { "type": "f64" } }"#,
        )
        .unwrap();
        assert_eq!(config.header_bytes(), 16);
        assert_eq!(config.n_arrays(), 1);
        assert_eq!(config.record_width(), 8);
        assert_eq!(config.layout().scale, 1.0);
        assert_eq!(config.layout().byte_order, ByteOrder::Little);

        let err = BinaryDecoderConfig::from_json(r#"{ "sample-rate": 1e6 }"#).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ParseFailed);
    }
}
