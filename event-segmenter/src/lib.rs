//! Threshold based event segmentation of nanopore current traces.
//!
//! A channel is one or more files of sampled current, read through an
//! [`input::InputChain`] in chunks of padded [`signal::SignalBuffer`]s. Each
//! chunk is measured against a baseline estimate and scanned for excursions,
//! which are collected as edges, events and durations.
pub mod baseline;
pub mod chain;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod input;
pub mod memory;
pub mod numeric;
pub mod parameters;
pub mod processing;
pub mod progress;
pub mod segmentation;
pub mod signal;

pub use error::{ErrorCode, RunState, SegmentError, SegmentResult};
pub use processing::{ChannelReport, Segmenter, segment_chain, segment_channel};
