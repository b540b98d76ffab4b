pub mod metrics;
pub mod tracer;

/// Physical sample values (picoamperes once decoded).
pub type Real = f64;
/// Position of a sample within a virtual channel.
pub type SampleIndex = usize;
pub type SampleRate = f64;

/// Converts a sample count at the given rate into seconds.
pub fn samples_to_seconds(samples: SampleIndex, sample_rate: SampleRate) -> Real {
    if sample_rate > 0.0 {
        samples as Real / sample_rate
    } else {
        0.0
    }
}
