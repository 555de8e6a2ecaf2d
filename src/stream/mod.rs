//! External sample-stream transport, at its interface.
//!
//! The stream nodes ([`StreamOutput`](crate::nodes::StreamOutput),
//! [`StreamInput`](crate::nodes::StreamInput)) only need four things from a
//! network audio transport: publish an outlet, push a chunk with per-sample
//! timestamps, find a stream by name, and pull whatever has arrived without
//! blocking. Those are the traits below. [`loopback`] implements them
//! in-process on top of ring buffers.

use alloc::string::String;
use alloc::vec::Vec;
use core::time::Duration;

use crate::error::ConfigError;
use crate::node::ProcessContext;

pub mod loopback;

pub use loopback::{LoopbackBus, LoopbackInlet, LoopbackOutlet};

/// How long [`StreamResolver::resolve`] may wait for a stream to appear.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted ratio between a stream's nominal rate and the host rate.
pub const SRATE_TOLERANCE: f64 = 1.05;

/// Declared sample type of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelFormat {
    Float32,
    Double64,
    Int32,
    Int16,
    Int8,
    String,
}

/// Metadata a stream declares when it is published.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub name: String,
    /// Content type, `"Audio"` for everything this crate publishes.
    pub stream_type: String,
    pub channel_count: usize,
    /// Declared sample rate in Hz.
    pub nominal_srate: f64,
    pub channel_format: ChannelFormat,
    pub source_id: String,
    /// Assigned by the transport when the outlet is created; 0 before that.
    pub uid: u64,
}

impl StreamInfo {
    /// A float32 audio stream matching the geometry of `ctx`.
    pub fn audio(name: impl Into<String>, source_id: impl Into<String>, ctx: &ProcessContext) -> Self {
        Self {
            name: name.into(),
            stream_type: "Audio".into(),
            channel_count: ctx.channels,
            nominal_srate: ctx.sample_rate as f64,
            channel_format: ChannelFormat::Float32,
            source_id: source_id.into(),
            uid: 0,
        }
    }

    /// Whether a host with geometry `ctx` can consume this stream directly.
    ///
    /// Type, channel count and sample format must match exactly. The sample
    /// rate may differ by less than [`SRATE_TOLERANCE`] either way.
    pub fn is_compatible(&self, ctx: &ProcessContext) -> bool {
        let host = ctx.sample_rate as f64;
        self.stream_type == "Audio"
            && self.channel_count == ctx.channels
            && self.channel_format == ChannelFormat::Float32
            && self.nominal_srate / host < SRATE_TOLERANCE
            && host / self.nominal_srate < SRATE_TOLERANCE
    }
}

/// First candidate a host with geometry `ctx` can consume.
pub fn select_stream(candidates: Vec<StreamInfo>, ctx: &ProcessContext) -> Option<StreamInfo> {
    candidates.into_iter().find(|info| info.is_compatible(ctx))
}

/// Sending end of a stream.
pub trait StreamOutlet: Send + 'static {
    /// Push interleaved `samples` with one timestamp per frame.
    ///
    /// Must not block. What happens to data the transport cannot take, or to
    /// NaN timestamps, is up to the implementation.
    fn push_chunk(&mut self, samples: &[f32], timestamps: &[f64]);
}

/// Receiving end of a stream.
pub trait StreamInlet: Send + 'static {
    /// Pull whatever has arrived, up to the capacity of both buffers.
    ///
    /// `samples` receives interleaved frames, `timestamps` one value per
    /// frame. Returns the number of frames written, 0 if nothing is
    /// available. Must return immediately.
    fn pull_chunk(&mut self, samples: &mut [f32], timestamps: &mut [f64]) -> usize;
}

/// Publishes outlets.
pub trait StreamProvider {
    type Outlet: StreamOutlet;

    /// Publish a stream described by `info`, pushed in chunks of
    /// `chunk_frames` frames.
    fn create_outlet(&self, info: StreamInfo, chunk_frames: usize) -> Result<Self::Outlet, ConfigError>;
}

/// Finds streams and opens inlets on them.
pub trait StreamResolver {
    type Inlet: StreamInlet;

    /// Streams called `name`, waiting up to `timeout` for at least one.
    fn resolve(&self, name: &str, timeout: Duration) -> Vec<StreamInfo>;

    /// Open an inlet that is pulled at most `max_chunk_frames` frames at a time.
    fn open_inlet(&self, info: &StreamInfo, max_chunk_frames: usize) -> Result<Self::Inlet, ConfigError>;
}
