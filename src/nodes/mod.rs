//! Built-in nodes.
//!
//! Nodes are organized into four categories:
//!
//! ## Timing ([`timing`])
//!
//! Pass audio through and publish times to the [`TimingStore`](crate::TimingStore):
//! - [`DllNode`] - Smoothed `t0`/`t1` block times from a delay-locked loop
//! - [`Timestamper`] - The raw, unfiltered clock reading of each block
//!
//! ## Sources ([`source`])
//!
//! Produce audio independently of their input:
//! - [`StreamInput`] - Place an external timestamped stream on the host timeline
//! - [`RtrbSource`] - Read interleaved audio from a ring buffer
//!
//! ## Effects ([`effect`])
//!
//! - [`Metronome`] - Splice a click into the signal on every beat
//!
//! ## Sinks ([`sink`])
//!
//! - [`StreamOutput`] - Push every block with per-sample timestamps to an outlet
//! - [`RtrbSink`] - Write interleaved audio to a ring buffer
//! - [`CpalSink`] - Output to a system audio device (requires `cpal_sink` feature)
//!
//! # Message Types
//!
//! Each configurable node takes a `Configure` message carrying a complete,
//! boxed replacement configuration built by its settings type. The swap
//! happens at the start of the node's next block.

pub mod effect;
pub mod sink;
pub mod source;
pub mod timing;

// Re-export common types at the top level for convenience
pub use effect::{BeatScheduler, ClickWaveform, FutureRing, Metronome, MetronomeConfig, MetronomeMessage, MetronomeSettings};
pub use sink::{RtrbSink, StreamOutput, StreamOutputConfig, StreamOutputMessage, StreamOutputSettings};
pub use source::{InletReader, RtrbSource, StreamInput, StreamInputConfig, StreamInputMessage, StreamInputSettings};
pub use timing::{DllConfig, DllMessage, DllNode, DllSettings, Timestamper, TimestamperConfig, TimestamperMessage, TimestamperSettings};

#[cfg(feature = "cpal_sink")]
pub use sink::CpalSink;

/// Settings equality where NaN ("unset") equals NaN.
#[inline]
pub(crate) fn same_f64(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}
