use nanoseg_common::Real;
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

fn leading<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

impl ByteOrder {
    fn u16(self, bytes: &[u8]) -> Option<u16> {
        let raw = leading::<2>(bytes)?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    fn u32(self, bytes: &[u8]) -> Option<u32> {
        let raw = leading::<4>(bytes)?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    fn u64(self, bytes: &[u8]) -> Option<u64> {
        let raw = leading::<8>(bytes)?;
        Some(match self {
            ByteOrder::Little => u64::from_le_bytes(raw),
            ByteOrder::Big => u64::from_be_bytes(raw),
        })
    }
}

/// Width and interpretation of one element of a record.
///
/// Integer variants may carry a bitmask, which is applied to the raw bit
/// pattern before it is interpreted (so a masked `I16` is still sign
/// extended from bit 15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SampleType {
    I16 { mask: Option<u16> },
    U16 { mask: Option<u16> },
    I32 { mask: Option<u32> },
    U32 { mask: Option<u32> },
    F32,
    F64,
}

impl SampleType {
    pub fn width(&self) -> usize {
        match self {
            SampleType::I16 { .. } | SampleType::U16 { .. } => 2,
            SampleType::I32 { .. } | SampleType::U32 { .. } | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// Interprets the first `width()` bytes of `bytes`. Returns `None` if too few bytes are given.
    pub fn interpret(&self, bytes: &[u8], order: ByteOrder) -> Option<Real> {
        Some(match *self {
            SampleType::I16 { mask } => {
                (order.u16(bytes)? & mask.unwrap_or(u16::MAX)) as i16 as Real
            }
            SampleType::U16 { mask } => (order.u16(bytes)? & mask.unwrap_or(u16::MAX)) as Real,
            SampleType::I32 { mask } => {
                (order.u32(bytes)? & mask.unwrap_or(u32::MAX)) as i32 as Real
            }
            SampleType::U32 { mask } => (order.u32(bytes)? & mask.unwrap_or(u32::MAX)) as Real,
            SampleType::F32 => f32::from_bits(order.u32(bytes)?) as Real,
            SampleType::F64 => f64::from_bits(order.u64(bytes)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(SampleType::I16 { mask: None }.width(), 2);
        assert_eq!(SampleType::U32 { mask: Some(0xFF) }.width(), 4);
        assert_eq!(SampleType::F32.width(), 4);
        assert_eq!(SampleType::F64.width(), 8);
    }

    #[test]
    fn byte_order() {
        let bytes = [0x01, 0x02];
        let u16_type = SampleType::U16 { mask: None };
        assert_eq!(u16_type.interpret(&bytes, ByteOrder::Little), Some(513.0));
        assert_eq!(u16_type.interpret(&bytes, ByteOrder::Big), Some(258.0));
    }

    #[test]
    fn signed_values_after_mask() {
        let bytes = (-3i16).to_le_bytes();
        assert_eq!(
            SampleType::I16 { mask: None }.interpret(&bytes, ByteOrder::Little),
            Some(-3.0)
        );
        // Clearing the two low bits of 0xFFFD leaves 0xFFFC.
        assert_eq!(
            SampleType::I16 { mask: Some(0xFFFC) }.interpret(&bytes, ByteOrder::Little),
            Some(-4.0)
        );
        let bytes = (-70000i32).to_be_bytes();
        assert_eq!(
            SampleType::I32 { mask: None }.interpret(&bytes, ByteOrder::Big),
            Some(-70000.0)
        );
    }

    #[test]
    fn floats() {
        let bytes = 1.5f32.to_le_bytes();
        assert_eq!(SampleType::F32.interpret(&bytes, ByteOrder::Little), Some(1.5));
        let bytes = (-2.25f64).to_be_bytes();
        assert_eq!(SampleType::F64.interpret(&bytes, ByteOrder::Big), Some(-2.25));
    }

    #[test]
    fn short_input() {
        assert_eq!(SampleType::F64.interpret(&[0; 7], ByteOrder::Little), None);
    }

    #[test]
    fn layout_json() {
        let parsed: SampleType = serde_json::from_str(r#"{"type":"u16","mask":65532}"#).unwrap();
        assert_eq!(parsed, SampleType::U16 { mask: Some(0xFFFC) });
        let parsed: SampleType = serde_json::from_str(r#"{"type":"i32"}"#).unwrap();
        assert_eq!(parsed, SampleType::I32 { mask: None });
        assert!(serde_json::from_str::<SampleType>(r#"{"type":"i64"}"#).is_err());
    }
}
