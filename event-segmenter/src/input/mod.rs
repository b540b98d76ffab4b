//! Several recordings presented as one continuous channel.
mod source;

pub use source::{MemorySource, SampleSource};

use crate::{
    chain::{Chain, NodeHandle},
    decoder::{ChimeraSetup, DataFormat, LinearDecoder, default_settings_path},
    error::{SegmentError, SegmentResult},
};
use nanoseg_common::{Real, SampleRate};
use std::{
    fs::File,
    io::{Seek, SeekFrom},
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Number of whole records in the file.
    pub length: usize,
    pub timestamp: Real,
    /// Position of the first record of this file in the virtual channel.
    pub offset: usize,
    /// Acquisition settings, for formats which store them per file.
    pub daq: Option<ChimeraSetup>,
}

impl InputFile {
    fn contains(&self, index: usize) -> bool {
        index >= self.offset && index - self.offset < self.length
    }
}

/// Measures a file without keeping it open.
fn file_size(path: &Path) -> SegmentResult<u64> {
    let mut file = File::open(path).map_err(|source| SegmentError::FileOpen {
        path: path.to_owned(),
        source,
    })?;
    file.seek(SeekFrom::End(0))
        .map_err(|source| SegmentError::FileRead {
            path: path.to_owned(),
            source,
        })
}

/// The files of one virtual channel, in acquisition order.
#[derive(Debug, Clone)]
pub struct InputChain {
    format: DataFormat,
    files: Chain<InputFile>,
}

impl InputChain {
    pub fn new(format: DataFormat) -> SegmentResult<Self> {
        format.ensure_supported()?;
        Ok(Self {
            format,
            files: Chain::default(),
        })
    }

    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    pub fn files(&self) -> &Chain<InputFile> {
        &self.files
    }

    /// Registers a file at the end of the channel.
    ///
    /// Chimera recordings need their settings file; when `settings` is `None`
    /// the file with the data file's stem and a `.settings` extension is used.
    /// Nothing is appended if any step fails.
    pub fn append(&mut self, path: &Path, settings: Option<&Path>) -> SegmentResult<NodeHandle> {
        let daq = match self.format {
            DataFormat::Chimera => {
                let settings = settings
                    .map(Path::to_owned)
                    .unwrap_or_else(|| default_settings_path(path));
                Some(ChimeraSetup::load(&settings)?)
            }
            _ => None,
        };

        let header = self.format.header_bytes()?;
        let width = self.format.record_width()? as u64;
        let bytes = file_size(path)?;
        let length = usize::try_from(bytes.saturating_sub(header) / width).map_err(|_| {
            SegmentError::Config(format!("{path:?} holds more records than can be addressed"))
        })?;

        let previous = self.files.last();
        let timestamp = daq
            .as_ref()
            .and_then(|daq| daq.timestamp)
            .unwrap_or_else(|| previous.map(|file| file.timestamp).unwrap_or_default() + 1.0);
        let offset = previous.map(|file| file.offset + file.length).unwrap_or_default();

        debug!("Registered {path:?}: {length} records from {offset}, timestamp {timestamp}");
        self.files.append(InputFile {
            path: path.to_owned(),
            length,
            timestamp,
            offset,
            daq,
        })
    }

    /// Length of the virtual channel in records.
    pub fn total_length(&self) -> usize {
        self.files.iter().map(|file| file.length).sum()
    }

    /// Orders the files by timestamp and recomputes their offsets.
    /// Handles returned by [`InputChain::append`] refer to positions, so they
    /// may name different files afterwards.
    pub fn sort_by_timestamp(&mut self) {
        let files = self.files.as_mut_slice();
        files.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let mut offset = 0;
        for file in files {
            file.offset = offset;
            offset += file.length;
        }
    }

    /// Maps a virtual index onto a file and the index within that file.
    pub fn locate(&self, index: usize) -> Option<(NodeHandle, usize)> {
        self.files
            .handles()
            .find(|&handle| self.files[handle].contains(index))
            .map(|handle| (handle, index - self.files[handle].offset))
    }

    pub fn sample_rate(&self) -> SegmentResult<SampleRate> {
        match &self.format {
            DataFormat::Binary(config) => Ok(config.sample_rate()),
            DataFormat::Chimera => self
                .files
                .iter()
                .find_map(|file| file.daq.as_ref())
                .map(|daq| daq.sample_rate)
                .filter(|rate| *rate > 0.0)
                .ok_or_else(|| SegmentError::Config("no sample rate in any settings file".into())),
            DataFormat::IgorOpt | DataFormat::EoneDat => {
                self.format.ensure_supported().map(|_| 0.0)
            }
        }
    }

    /// The decoder for the records of one file.
    pub fn decoder(&self, handle: NodeHandle) -> SegmentResult<LinearDecoder> {
        match &self.format {
            DataFormat::Binary(config) => Ok(config.decoder()),
            DataFormat::Chimera => self
                .files
                .get(handle)
                .and_then(|file| file.daq.as_ref())
                .ok_or_else(|| SegmentError::Config("file has no acquisition settings".into()))?
                .decoder(),
            DataFormat::IgorOpt | DataFormat::EoneDat => {
                Err(SegmentError::UnsupportedFormat(self.format.tag().to_string()))
            }
        }
    }
}
