//! Timestamped stream output

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use dasp_graph::{Buffer, Input};
use tracing::info;

use crate::error::ConfigError;
use crate::node::{pass_through, AudioNode, ProcessContext};
use crate::store::{TimeWindow, TimingStore};
use crate::stream::{StreamInfo, StreamOutlet, StreamProvider};

/// Fill `out` with evenly spaced times from `t0` towards `t1`.
///
/// The step is `(t1 - t0) / out.len()`, so the last timestamp is one step
/// short of `t1`, which is the first timestamp of the next block. A NaN
/// window yields NaN timestamps.
///
/// ```
/// use zeitgeber::nodes::sink::block_timestamps;
///
/// let mut ts = [0.0; 4];
/// block_timestamps(2.0, 3.0, &mut ts);
/// assert_eq!(ts, [2.0, 2.25, 2.5, 2.75]);
/// ```
pub fn block_timestamps(t0: f64, t1: f64, out: &mut [f64]) {
    let step = (t1 - t0) / out.len() as f64;
    for (k, timestamp) in out.iter_mut().enumerate() {
        *timestamp = t0 + k as f64 * step;
    }
}

/// User-facing parameters of a [`StreamOutput`].
#[derive(Clone, Debug, PartialEq)]
pub struct StreamOutputSettings {
    /// Base name of the DLL times to stamp with.
    pub time_base: String,
    pub stream_name: String,
    pub source_id: String,
}

impl Default for StreamOutputSettings {
    fn default() -> Self {
        Self {
            time_base: "dll".into(),
            stream_name: "wav2lsl".into(),
            source_id: String::new(),
        }
    }
}

impl StreamOutputSettings {
    /// Publish a new outlet on `provider` matching the host geometry.
    pub fn build<P: StreamProvider>(
        &self,
        ctx: &ProcessContext,
        store: &TimingStore,
        provider: &P,
    ) -> Result<StreamOutputConfig<P::Outlet>, ConfigError> {
        // A channel-less host still sends a mono stream of silence
        let ctx = &ProcessContext {
            channels: ctx.channels.max(1),
            ..*ctx
        };
        let info = StreamInfo::audio(self.stream_name.clone(), self.source_id.clone(), ctx);
        let outlet = provider.create_outlet(info, ctx.buffer_size)?;
        info!(
            stream = %self.stream_name,
            source_id = %self.source_id,
            time_base = %self.time_base,
            "stream output ready"
        );

        Ok(StreamOutputConfig {
            outlet,
            window: store.window(&self.time_base),
            channels: ctx.channels,
            samples: vec![0.0; ctx.buffer_size * ctx.channels],
            timestamps: vec![0.0; ctx.buffer_size],
        })
    }
}

/// An open outlet plus the scratch space to interleave one block.
pub struct StreamOutputConfig<O> {
    outlet: O,
    window: TimeWindow,
    channels: usize,
    samples: Vec<f32>,
    timestamps: Vec<f64>,
}

impl<O> StreamOutputConfig<O> {
    pub fn outlet(&self) -> &O {
        &self.outlet
    }
}

/// Messages to reconfigure a [`StreamOutput`]
pub enum StreamOutputMessage<O> {
    /// Swap in a new outlet. The old one is closed when the message is dropped.
    Configure(Box<StreamOutputConfig<O>>),
}

impl<O> StreamOutputMessage<O> {
    pub fn configure(config: StreamOutputConfig<O>) -> Self {
        StreamOutputMessage::Configure(Box::new(config))
    }
}

/// Sends every block, with one timestamp per sample, to an external stream.
///
/// Audio passes through unchanged. Timestamps come from the DLL window of
/// the same block, so they stay on the host's sample clock even when the
/// callback itself jitters.
pub struct StreamOutput<O: StreamOutlet> {
    config: StreamOutputConfig<O>,
}

impl<O: StreamOutlet> StreamOutput<O> {
    pub fn new(config: StreamOutputConfig<O>) -> Self {
        Self { config }
    }
}

impl<O: StreamOutlet> AudioNode for StreamOutput<O> {
    type Message = StreamOutputMessage<O>;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = StreamOutputMessage<O>>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                StreamOutputMessage::Configure(config) => self.config = *config,
            }
        }

        pass_through(inputs, outputs);

        let config = &mut self.config;
        let Some(frames) = outputs.first().map(|b| b.len()) else { return };
        let frames = frames.min(config.timestamps.len());

        let (t0, t1) = config.window.read();
        block_timestamps(t0, t1, &mut config.timestamps[..frames]);

        for (i, frame) in config.samples.chunks_exact_mut(config.channels).take(frames).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = outputs.get(ch).map_or(0.0, |b| b[i]);
            }
        }

        config
            .outlet
            .push_chunk(&config.samples[..frames * config.channels], &config.timestamps[..frames]);
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { self.config.channels }
}
