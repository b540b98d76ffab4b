use super::InputChain;
use crate::{
    decoder::SampleDecoder,
    error::{SegmentError, SegmentResult},
};
use nanoseg_common::Real;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

/// Random access to the decoded samples of one channel.
pub trait SampleSource {
    /// Number of samples in the channel.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes samples `[start, start + out.len())` into `out`.
    /// `raw` is scratch space for undecoded bytes; any size of at least one record works.
    fn read_into(&self, start: usize, raw: &mut [u8], out: &mut [Real]) -> SegmentResult<()>;
}

fn check_range(start: usize, requested: usize, available: usize) -> SegmentResult<()> {
    match start.checked_add(requested) {
        Some(end) if end <= available => Ok(()),
        _ => Err(SegmentError::BadPadding {
            start,
            requested,
            available,
        }),
    }
}

/// Already decoded samples held in memory.
#[derive(Debug, Clone, Copy)]
pub struct MemorySource<'a>(pub &'a [Real]);

impl SampleSource for MemorySource<'_> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn read_into(&self, start: usize, _raw: &mut [u8], out: &mut [Real]) -> SegmentResult<()> {
        check_range(start, out.len(), self.0.len())?;
        out.copy_from_slice(&self.0[start..start + out.len()]);
        Ok(())
    }
}

impl SampleSource for InputChain {
    fn len(&self) -> usize {
        self.total_length()
    }

    /// Each file touched by the range is opened, read and closed in turn.
    fn read_into(&self, start: usize, raw: &mut [u8], out: &mut [Real]) -> SegmentResult<()> {
        check_range(start, out.len(), self.total_length())?;
        let header = self.format().header_bytes()?;

        let mut position = start;
        let mut remaining = out;
        while !remaining.is_empty() {
            let (handle, local) = self.locate(position).ok_or(SegmentError::BadPadding {
                start: position,
                requested: remaining.len(),
                available: self.total_length(),
            })?;
            let input = &self.files()[handle];
            let decoder = self.decoder(handle)?;
            let width = decoder.record_width();
            let block = raw.len() / width;
            if block == 0 {
                return Err(SegmentError::Config(format!(
                    "raw buffer of {} bytes cannot hold a {width} byte record",
                    raw.len()
                )));
            }

            let io_err = |source| SegmentError::FileRead {
                path: input.path.clone(),
                source,
            };
            let mut file = File::open(&input.path).map_err(|source| SegmentError::FileOpen {
                path: input.path.clone(),
                source,
            })?;
            file.seek(SeekFrom::Start(header + (local * width) as u64))
                .map_err(io_err)?;

            let in_file = remaining.len().min(input.length - local);
            let (this_file, rest) = remaining.split_at_mut(in_file);
            for chunk in this_file.chunks_mut(block) {
                let bytes = &mut raw[..chunk.len() * width];
                file.read_exact(bytes).map_err(io_err)?;
                for (value, record) in chunk.iter_mut().zip(bytes.chunks_exact(width)) {
                    *value = decoder.decode(record).ok_or_else(|| {
                        SegmentError::InvalidDecoder(format!(
                            "record of {width} bytes is too short for its layout"
                        ))
                    })?;
                }
            }
            position += in_file;
            remaining = rest;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::DataFormat,
        error::ErrorCode,
        input::tests::{i16_layout, write_file},
    };

    fn i16_bytes(values: impl IntoIterator<Item = i16>) -> Vec<u8> {
        values.into_iter().flat_map(i16::to_le_bytes).collect()
    }

    #[test]
    fn memory_source_bounds() {
        let data = [1.0, 2.0, 3.0];
        let source = MemorySource(&data);
        let mut out = [0.0; 2];
        source.read_into(1, &mut [], &mut out).unwrap();
        assert_eq!(out, [2.0, 3.0]);
        let err = source.read_into(2, &mut [], &mut out).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadPadding);
    }

    #[test]
    fn read_spans_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut header = vec![0xAA; 4];
        header.extend(i16_bytes(0..10));
        let first = write_file(&dir, "a.bin", &header);
        let mut header = vec![0xAA; 4];
        header.extend(i16_bytes(10..25));
        let second = write_file(&dir, "b.bin", &header);

        let mut chain = InputChain::new(DataFormat::Binary(i16_layout(4, 1))).unwrap();
        chain.append(&first, None).unwrap();
        chain.append(&second, None).unwrap();
        assert_eq!(chain.len(), 25);

        // A raw buffer of three records forces several reads per file.
        let mut raw = [0u8; 6];
        let mut out = vec![0.0; 12];
        chain.read_into(5, &mut raw, &mut out).unwrap();
        let expected: Vec<Real> = (5..17).map(Real::from).collect();
        assert_eq!(out, expected);

        let err = chain.read_into(20, &mut raw, &mut out).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadPadding);
    }

    #[test]
    fn interleaved_channel() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<i16> = (0..8).flat_map(|i| [i, -i]).collect();
        let path = write_file(&dir, "pair.bin", &i16_bytes(records));
        let config = i16_layout(0, 2).with_array_index(1).unwrap();
        let mut chain = InputChain::new(DataFormat::Binary(config)).unwrap();
        chain.append(&path, None).unwrap();

        let mut raw = [0u8; 16];
        let mut out = vec![0.0; 8];
        chain.read_into(0, &mut raw, &mut out).unwrap();
        assert_eq!(out, vec![0.0, -1.0, -2.0, -3.0, -4.0, -5.0, -6.0, -7.0]);
    }
}
