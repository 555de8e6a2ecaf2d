//! Ring buffer source
//!
//! Feeds interleaved audio produced on another thread into the graph at the
//! graph's own rate. No rate conversion happens here; the producer is
//! expected to run at the graph's sample rate.

use dasp_graph::{Buffer, Input};
use rtrb::Consumer;

use crate::node::{AudioNode, ProcessContext};

/// A source that reads interleaved frames from a ring buffer
pub struct RtrbSource {
    consumer: Consumer<f32>,
    channels: usize,
    underruns: u64,
}

impl RtrbSource {
    /// - `consumer`: Ring buffer consumer with interleaved samples
    /// - `channels`: Number of interleaved channels in the ring
    pub fn new(consumer: Consumer<f32>, channels: usize) -> Self {
        Self {
            consumer,
            channels: channels.max(1),
            underruns: 0,
        }
    }

    /// Number of blocks that ran out of data before they were full.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

impl AudioNode for RtrbSource {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let Some(frames) = outputs.first().map(|b| b.len()) else { return };

        for i in 0..frames {
            // Only whole frames are consumed
            if self.consumer.slots() < self.channels {
                self.underruns += 1;
                for buffer in outputs.iter_mut() {
                    buffer[i..].iter_mut().for_each(|s| *s = 0.0);
                }
                return;
            }

            for ch in 0..self.channels {
                let sample = self.consumer.pop().unwrap_or(0.0);
                if let Some(buffer) = outputs.get_mut(ch) {
                    buffer[i] = sample;
                }
            }
            // Extra graph channels repeat the last ring channel
            if let Some(last) = outputs.get(self.channels - 1).map(|b| b[i]) {
                for buffer in outputs.iter_mut().skip(self.channels) {
                    buffer[i] = last;
                }
            }
        }
    }

    #[inline]
    fn num_outputs(&self) -> usize { self.channels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_whole_frames() {
        let (mut producer, consumer) = rtrb::RingBuffer::new(4 * Buffer::LEN);
        for i in 0..Buffer::LEN {
            producer.push(i as f32).unwrap();
            producer.push(-(i as f32)).unwrap();
        }
        let mut source = RtrbSource::new(consumer, 2);
        let ctx = ProcessContext::new(48_000, 2);
        let mut out = [Buffer::SILENT, Buffer::SILENT];
        source.process(&ctx, core::iter::empty(), &[], &mut out);

        assert_eq!(out[0][10], 10.0);
        assert_eq!(out[1][10], -10.0);
        assert_eq!(source.underruns(), 0);
    }

    #[test]
    fn underrun_fills_silence() {
        let (mut producer, consumer) = rtrb::RingBuffer::new(16);
        for _ in 0..3 {
            producer.push(0.5).unwrap();
        }
        let mut source = RtrbSource::new(consumer, 1);
        let ctx = ProcessContext::new(48_000, 1);
        let mut out = [Buffer::SILENT];
        out[0].iter_mut().for_each(|s| *s = 9.0);
        source.process(&ctx, core::iter::empty(), &[], &mut out);

        assert_eq!(&out[0][..3], &[0.5; 3]);
        assert!(out[0][3..].iter().all(|&s| s == 0.0));
        assert_eq!(source.underruns(), 1);
    }
}
