use crate::{
    decoder::DataFormat,
    error::{SegmentError, SegmentResult},
    input::SampleSource,
    memory::BufferAllocator,
};
use nanoseg_common::Real;
use std::ops::Range;
use tracing::trace;

/// Filter geometry which determines the margins around each chunk.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    /// One sided transient of the filter applied to the whole chunk.
    pub data_order: usize,
    /// One sided transient of the filter applied to each event.
    pub event_order: usize,
    /// Additional margin on both sides.
    pub extra: usize,
}

impl Padding {
    /// Margin on each side of the usable window.
    ///
    /// An event closing on the last usable sample is captured up to
    /// `extra + event_order` samples beyond the window, and those samples
    /// must still lie `data_order` clear of the end of the buffer.
    pub fn pad(&self) -> usize {
        self.data_order + self.event_order + self.extra
    }

    /// Start of the usable window within the padded buffer.
    pub fn usable_offset(&self) -> usize {
        self.data_order + self.extra
    }
}

/// Working storage for one chunk of a channel.
///
/// `padded` holds `read_length + 2 * pad` decoded samples; the usable window
/// starts `data_order + extra` samples in, so a filter of either order can
/// read past both ends of the window without bounds checks.
#[derive(Debug)]
pub struct SignalBuffer {
    padded: Vec<Real>,
    raw: Vec<u8>,
    read_length: usize,
    padding: Padding,
    start: usize,
    valid: usize,
}

impl SignalBuffer {
    /// Allocates both buffers, or nothing.
    ///
    /// The format is checked before any allocation, so a reserved format
    /// never reaches the allocator.
    pub fn new<A: BufferAllocator>(
        read_length: usize,
        padding: Padding,
        format: &DataFormat,
        allocator: &A,
    ) -> SegmentResult<Self> {
        format.ensure_supported()?;
        if read_length == 0 {
            return Err(SegmentError::Config("read length must be positive".into()));
        }
        let record_width = format.record_width()?;
        let padded_length = padding
            .pad()
            .checked_mul(2)
            .and_then(|margin| margin.checked_add(read_length))
            .ok_or_else(|| SegmentError::Config("padded length overflows".into()))?;
        let raw_length = read_length
            .checked_mul(record_width)
            .ok_or_else(|| SegmentError::Config("raw buffer length overflows".into()))?;

        let padded = allocator.allocate(padded_length, 0.0)?;
        let raw = allocator.allocate(raw_length, 0u8)?;
        trace!("Allocated {padded_length} samples and {raw_length} raw bytes");
        Ok(Self {
            padded,
            raw,
            read_length,
            padding,
            start: 0,
            valid: 0,
        })
    }

    pub fn read_length(&self) -> usize {
        self.read_length
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn padded(&self) -> &[Real] {
        &self.padded
    }

    pub fn padded_mut(&mut self) -> &mut [Real] {
        &mut self.padded
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub fn usable_offset(&self) -> usize {
        self.padding.usable_offset()
    }

    /// Range of `padded()` holding the samples loaded by the last `fill`.
    pub fn usable_range(&self) -> Range<usize> {
        self.usable_offset()..self.usable_offset() + self.valid
    }

    pub fn usable(&self) -> &[Real] {
        &self.padded[self.usable_range()]
    }

    /// Channel index of the first usable sample.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Loads the chunk beginning at `start` and its margins.
    ///
    /// Margins which fall outside the channel repeat the nearest sample that
    /// lies inside it. Returns the number of usable samples, which is less
    /// than `read_length` only for the final chunk.
    pub fn fill<S: SampleSource + ?Sized>(&mut self, source: &S, start: usize) -> SegmentResult<usize> {
        let total = source.len();
        if start >= total {
            return Err(SegmentError::BadPadding {
                start,
                requested: 1,
                available: total,
            });
        }
        let offset = self.usable_offset();
        let valid = self.read_length.min(total - start);

        let lead = offset.min(start);
        let first = start - lead;
        let end = (start + self.padded.len() - offset).min(total);
        let lo = offset - lead;
        let hi = lo + (end - first);

        source.read_into(first, &mut self.raw, &mut self.padded[lo..hi])?;

        let (left, right) = (self.padded[lo], self.padded[hi - 1]);
        self.padded[..lo].fill(left);
        self.padded[hi..].fill(right);

        self.start = start;
        self.valid = valid;
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::{BinaryDecoderConfig, BinaryLayout, ByteOrder, SampleType},
        error::ErrorCode,
        input::MemorySource,
        memory::SystemAllocator,
    };

    fn padding() -> Padding {
        Padding {
            data_order: 2,
            event_order: 4,
            extra: 1,
        }
    }

    #[test]
    fn geometry() {
        let buffer = SignalBuffer::new(10, padding(), &DataFormat::Chimera, &SystemAllocator).unwrap();
        assert_eq!(buffer.padded().len(), 10 + 2 * 7);
        assert_eq!(buffer.usable_offset(), 3);
        assert_eq!(buffer.raw_len(), 20);
    }

    #[test]
    fn raw_width_follows_format() {
        let config = BinaryDecoderConfig::new(BinaryLayout {
            header_bytes: 0,
            sample_rate: 1.0,
            n_arrays: 4,
            array_index: 0,
            sample_type: SampleType::F64,
            byte_order: ByteOrder::Big,
            scale: 1.0,
            offset: 0.0,
        })
        .unwrap();
        let buffer =
            SignalBuffer::new(10, padding(), &DataFormat::Binary(config), &SystemAllocator).unwrap();
        assert_eq!(buffer.raw_len(), 320);
    }

    #[test]
    fn reserved_format_is_rejected_before_allocation() {
        let err = SignalBuffer::new(10, padding(), &DataFormat::IgorOpt, &SystemAllocator).unwrap_err();
        assert!(matches!(err, SegmentError::UnsupportedFormat(_)));
        assert_eq!(err.code(), ErrorCode::Invalid);
    }

    #[test]
    fn margins_hold_neighbouring_samples() {
        let data: Vec<Real> = (0..30).map(Real::from).collect();
        let source = MemorySource(&data);
        let mut buffer = SignalBuffer::new(10, padding(), &DataFormat::Chimera, &SystemAllocator).unwrap();

        assert_eq!(buffer.fill(&source, 0).unwrap(), 10);
        assert_eq!(buffer.usable(), &data[0..10]);
        assert_eq!(&buffer.padded()[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&buffer.padded()[13..], &data[10..21]);

        assert_eq!(buffer.fill(&source, 10).unwrap(), 10);
        assert_eq!(buffer.usable(), &data[10..20]);
        assert_eq!(&buffer.padded()[..3], &data[7..10]);
        assert_eq!(&buffer.padded()[13..23], &data[20..30]);
        assert_eq!(buffer.padded()[23], 29.0);

        assert_eq!(buffer.fill(&source, 25).unwrap(), 5);
        assert_eq!(buffer.usable(), &data[25..30]);
        assert!(buffer.padded()[8..].iter().all(|&x| x == 29.0));

        let err = buffer.fill(&source, 30).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadPadding);
    }
}
