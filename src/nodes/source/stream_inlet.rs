//! Stream input aligned to the host timeline
//!
//! An external stream runs on its own clock and arrives in chunks of
//! timestamped frames. For every sample of a block the node computes the
//! host time `t_k` from the DLL window and plays the earliest received frame
//! stamped at or after `t_k`. Nothing is interpolated; late, missing or
//! unconnected data is silence.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::time::Duration;

use dasp_graph::{Buffer, Input};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::node::{AudioNode, ProcessContext};
use crate::store::{TimeWindow, TimingStore};
use crate::stream::{select_stream, StreamInlet, StreamResolver, RESOLVE_TIMEOUT};

/// The most recently pulled chunk of an inlet plus a forward-only read cursor.
pub struct InletReader<I> {
    inlet: Option<I>,
    timestamps: Vec<f64>,
    samples: Vec<f32>,
    channels: usize,
    cursor: usize,
    fill: usize,
}

impl<I: StreamInlet> InletReader<I> {
    /// A reader pulling up to `chunk_frames` frames at a time.
    pub fn new(inlet: I, channels: usize, chunk_frames: usize) -> Self {
        let mut reader = Self::disconnected(channels, chunk_frames);
        reader.inlet = Some(inlet);
        reader
    }

    /// A reader without an inlet; every lookup is a miss.
    pub fn disconnected(channels: usize, chunk_frames: usize) -> Self {
        let channels = channels.max(1);
        let chunk_frames = chunk_frames.max(1);
        Self {
            inlet: None,
            timestamps: vec![0.0; chunk_frames],
            samples: vec![0.0; chunk_frames * channels],
            channels,
            cursor: 0,
            fill: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inlet.is_some()
    }

    /// Position of the next candidate frame in the current chunk.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The frame to play at host time `t`, or `None` for silence.
    ///
    /// When the current chunk is used up, or even its newest frame is older
    /// than `t`, chunks are pulled until one reaches `t` or the inlet has
    /// nothing more. The cursor only ever moves forward, so asking for an
    /// earlier `t` afterwards never replays older frames.
    pub fn sample_at(&mut self, t: f64) -> Option<&[f32]> {
        let inlet = self.inlet.as_mut()?;
        if !t.is_finite() {
            return None;
        }

        if self.cursor >= self.fill || self.timestamps[self.fill - 1] < t {
            loop {
                self.fill = inlet
                    .pull_chunk(&mut self.samples, &mut self.timestamps)
                    .min(self.timestamps.len());
                self.cursor = 0;
                if self.fill == 0 || self.timestamps[self.fill - 1] >= t {
                    break;
                }
            }
        }

        while self.cursor < self.fill {
            if self.timestamps[self.cursor] >= t {
                let start = self.cursor * self.channels;
                return Some(&self.samples[start..start + self.channels]);
            }
            self.cursor += 1;
        }
        None
    }
}

/// User-facing parameters of a [`StreamInput`].
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInputSettings {
    /// Base name of the DLL times that define the host timeline.
    pub time_base: String,
    pub stream_name: String,
    /// How long to wait for the stream to appear.
    pub resolve_timeout: Duration,
}

impl Default for StreamInputSettings {
    fn default() -> Self {
        Self {
            time_base: "dll".into(),
            stream_name: "wav2lsl".into(),
            resolve_timeout: RESOLVE_TIMEOUT,
        }
    }
}

impl StreamInputSettings {
    /// Find a compatible stream called `stream_name` and open an inlet on it.
    ///
    /// Blocks for up to `resolve_timeout`; call it off the audio thread.
    pub fn build<R: StreamResolver>(
        &self,
        ctx: &ProcessContext,
        store: &TimingStore,
        resolver: &R,
    ) -> Result<StreamInputConfig<R::Inlet>, ConfigError> {
        let candidates = resolver.resolve(&self.stream_name, self.resolve_timeout);
        let found = candidates.len();

        let Some(info) = select_stream(candidates, ctx) else {
            warn!(
                stream = %self.stream_name,
                candidates = found,
                channels = ctx.channels,
                sample_rate = ctx.sample_rate,
                "no compatible stream"
            );
            return Err(ConfigError::StreamNotFound {
                name: self.stream_name.clone(),
                channels: ctx.channels,
                sample_rate: ctx.sample_rate,
            });
        };

        let inlet = resolver.open_inlet(&info, ctx.buffer_size)?;
        info!(
            stream = %info.name,
            source_id = %info.source_id,
            srate = info.nominal_srate,
            time_base = %self.time_base,
            "stream input connected"
        );

        Ok(StreamInputConfig {
            reader: InletReader::new(inlet, ctx.channels, ctx.buffer_size),
            window: store.window(&self.time_base),
            channels: ctx.channels,
        })
    }
}

pub struct StreamInputConfig<I> {
    reader: InletReader<I>,
    window: TimeWindow,
    channels: usize,
}

impl<I: StreamInlet> StreamInputConfig<I> {
    /// A configuration that plays silence until a stream is connected.
    pub fn disconnected(ctx: &ProcessContext, store: &TimingStore, time_base: &str) -> Self {
        Self {
            reader: InletReader::disconnected(ctx.channels, ctx.buffer_size),
            window: store.window(time_base),
            channels: ctx.channels,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }
}

/// Messages to reconfigure a [`StreamInput`]
pub enum StreamInputMessage<I> {
    /// Swap in a new inlet. The old one is closed when the message is dropped.
    Configure(Box<StreamInputConfig<I>>),
}

impl<I> StreamInputMessage<I> {
    pub fn configure(config: StreamInputConfig<I>) -> Self {
        StreamInputMessage::Configure(Box::new(config))
    }
}

/// Plays an external stream on the host's sample clock.
///
/// Replaces its input: whatever arrives from the stream (or silence) is the
/// node's output.
pub struct StreamInput<I: StreamInlet> {
    config: StreamInputConfig<I>,
}

impl<I: StreamInlet> StreamInput<I> {
    pub fn new(config: StreamInputConfig<I>) -> Self {
        Self { config }
    }
}

impl<I: StreamInlet> AudioNode for StreamInput<I> {
    type Message = StreamInputMessage<I>;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = StreamInputMessage<I>>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                StreamInputMessage::Configure(config) => self.config = *config,
            }
        }

        let Some(frames) = outputs.first().map(|b| b.len()) else { return };
        let (t0, t1) = self.config.window.read();
        let dt = (t1 - t0) / frames as f64;

        for k in 0..frames {
            let t = t0 + k as f64 * dt;
            match self.config.reader.sample_at(t) {
                Some(frame) => {
                    for (ch, buffer) in outputs.iter_mut().enumerate() {
                        buffer[k] = frame.get(ch).or(frame.last()).copied().unwrap_or(0.0);
                    }
                }
                None => outputs.iter_mut().for_each(|buffer| buffer[k] = 0.0),
            }
        }
    }

    #[inline]
    fn num_outputs(&self) -> usize { self.config.channels }
}
