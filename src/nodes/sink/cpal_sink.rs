//! CPAL audio output sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfig};
use dasp_graph::{Buffer, Input};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, info, warn};

use crate::node::{AudioNode, ProcessContext};

/// A sink that outputs audio to a CPAL device
///
/// The CPAL stream runs on its own thread; this node feeds samples
/// into a ring buffer that the stream consumes. A DLL in the graph sees the
/// pacing of whoever calls [`Zeitgeber::process`](crate::Zeitgeber::process),
/// not the device callback.
pub struct CpalSink {
    buffer: Producer<f32>,
    channels: usize,
    /// Set by the device callback when it ran out of samples
    had_underrun: Arc<AtomicBool>,
}

impl CpalSink {
    /// Create a new sink for the given device and config
    pub fn new(device: &cpal::Device, config: &SupportedStreamConfig) -> Self {
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config = config.config();
        let sample_rate = stream_config.sample_rate.0;

        // ~100ms of audio absorbs scheduling jitter
        let buffer_samples = ((sample_rate as f32 * 0.1) as usize) * channels;
        let buffer_size = buffer_samples.next_power_of_two().max(8192);
        let (producer, consumer) = RingBuffer::<f32>::new(buffer_size);

        let had_underrun = Arc::new(AtomicBool::new(false));

        let device = device.clone();
        let underrun = had_underrun.clone();
        std::thread::spawn(move || {
            let stream = match build_stream(&device, sample_format, &stream_config, consumer, underrun) {
                Ok(stream) => stream,
                Err(err) => {
                    error!(%err, ?sample_format, "failed to build output stream");
                    return;
                }
            };
            if let Err(err) = stream.play() {
                error!(%err, "failed to start output stream");
                return;
            }
            info!(sample_rate, channels, "output stream running");

            // The stream lives as long as this thread
            loop {
                std::thread::park();
            }
        });

        Self {
            buffer: producer,
            channels,
            had_underrun,
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    consumer: Consumer<f32>,
    had_underrun: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    match sample_format {
        SampleFormat::F32 => build_typed::<f32>(device, stream_config, consumer, had_underrun),
        SampleFormat::I16 => build_typed::<i16>(device, stream_config, consumer, had_underrun),
        SampleFormat::U16 => build_typed::<u16>(device, stream_config, consumer, had_underrun),
        SampleFormat::I32 => build_typed::<i32>(device, stream_config, consumer, had_underrun),
        _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    had_underrun: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    device.build_output_stream(
        stream_config,
        move |data: &mut [T], _| {
            let mut underrun = false;
            for sample in data.iter_mut() {
                let s = consumer.pop().unwrap_or_else(|_| {
                    underrun = true;
                    0.0
                });
                *sample = T::from_sample(s.clamp(-1.0, 1.0));
            }
            if underrun {
                had_underrun.store(true, Ordering::Relaxed);
            }
        },
        |err| warn!(%err, "output stream error"),
        None,
    )
}

impl AudioNode for CpalSink {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        if self.had_underrun.swap(false, Ordering::Relaxed) {
            debug!("output device ran dry");
        }

        let Some(input) = inputs.first() else { return };
        let buffers = input.buffers();
        let Some(first) = buffers.first() else { return };

        let frames = first.len();
        // Generating faster than the device plays: skip rather than write partially
        if self.buffer.slots() < frames * self.channels {
            return;
        }

        for i in 0..frames {
            for ch in 0..self.channels {
                // Duplicate the last input channel onto extra device channels
                let src_ch = ch.min(buffers.len() - 1);
                let _ = self.buffer.push(buffers[src_ch][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
