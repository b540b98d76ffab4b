use super::{ByteOrder, LinearDecoder, SampleType};
use crate::error::{SegmentError, SegmentResult};
use nanoseg_common::{Real, SampleRate};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::trace;

/// Bytes per Chimera sample. Chimera files carry no header.
pub const CHIMERA_SAMPLE_BYTES: usize = 2;

const PICOAMPS_PER_AMP: Real = 1e12;
const ADC_FULL_SCALE: Real = 65536.0;

/// Acquisition settings read from the companion file of a Chimera recording.
#[derive(Debug, Clone, PartialEq)]
pub struct ChimeraSetup {
    pub tia_gain: Real,
    pub sample_rate: SampleRate,
    pub pre_adc_gain: Real,
    /// Amperes.
    pub current_offset: Real,
    pub adc_vref: Real,
    pub adc_bits: u32,
    pub timestamp: Option<Real>,
}

impl Default for ChimeraSetup {
    fn default() -> Self {
        Self {
            tia_gain: 0.0,
            sample_rate: 0.0,
            pre_adc_gain: 0.0,
            current_offset: 0.0,
            adc_vref: 0.0,
            adc_bits: 16,
            timestamp: None,
        }
    }
}

/// The companion file Chimera writes next to `data`.
pub fn default_settings_path(data: &Path) -> PathBuf {
    data.with_extension("settings")
}

fn parse_value<T: FromStr>(path: &Path, line: usize, key: &str, value: &str) -> SegmentResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SegmentError::SettingsValue {
            path: path.to_owned(),
            line,
            key: key.to_owned(),
            value: value.to_owned(),
        })
}

impl ChimeraSetup {
    /// Parses `KEY=VALUE` lines. Unrecognised keys and lines without `=` are skipped.
    pub fn parse(text: &str, path: &Path) -> SegmentResult<Self> {
        let mut setup = ChimeraSetup::default();
        for (number, line) in text.lines().enumerate() {
            let number = number + 1;
            let Some((key, value)) = line.split_once('=') else {
                if !line.trim().is_empty() {
                    trace!("Skipping line {number} of {path:?}: no '='");
                }
                continue;
            };
            let key = key.trim();
            match key {
                "SETUP_TIAgain" => setup.tia_gain = parse_value(path, number, key, value)?,
                "ADCSAMPLERATE" => setup.sample_rate = parse_value(path, number, key, value)?,
                "SETUP_preADCgain" => setup.pre_adc_gain = parse_value(path, number, key, value)?,
                "SETUP_pAoffset" => setup.current_offset = parse_value(path, number, key, value)?,
                "SETUP_ADCVREF" => setup.adc_vref = parse_value(path, number, key, value)?,
                "SETUP_ADCBITS" => setup.adc_bits = parse_value(path, number, key, value)?,
                "mytimestamp" => setup.timestamp = Some(parse_value(path, number, key, value)?),
                _ => {}
            }
        }
        Ok(setup)
    }

    pub fn load(path: &Path) -> SegmentResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| SegmentError::FileOpen {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Closed loop gain of the amplifier chain.
    pub fn gain(&self) -> Real {
        self.tia_gain * self.pre_adc_gain
    }

    /// Keeps the `adc_bits` most significant bits of each sample.
    pub fn bitmask(&self) -> SegmentResult<u16> {
        if !(1..=16).contains(&self.adc_bits) {
            return Err(SegmentError::Config(format!(
                "ADC bit depth must lie in 1..=16, got {}",
                self.adc_bits
            )));
        }
        let discarded = (1u32 << (16 - self.adc_bits)) - 1;
        Ok(0xFFFF - discarded as u16)
    }

    /// Maps ADC counts to picoamperes.
    pub fn decoder(&self) -> SegmentResult<LinearDecoder> {
        let gain = self.gain();
        if !gain.is_finite() || gain == 0.0 {
            return Err(SegmentError::Config(format!(
                "closed loop gain must be non-zero, got {gain}"
            )));
        }
        if !self.adc_vref.is_finite() || self.adc_vref == 0.0 {
            return Err(SegmentError::Config(format!(
                "ADC reference voltage must be non-zero, got {}",
                self.adc_vref
            )));
        }
        Ok(LinearDecoder {
            sample_type: SampleType::U16 {
                mask: Some(self.bitmask()?),
            },
            byte_order: ByteOrder::Little,
            element_offset: 0,
            record_width: CHIMERA_SAMPLE_BYTES,
            scale: 2.0 * self.adc_vref / (ADC_FULL_SCALE * gain) * PICOAMPS_PER_AMP,
            offset: (-self.adc_vref / gain + self.current_offset) * PICOAMPS_PER_AMP,
        })
    }
}
