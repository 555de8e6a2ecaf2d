//! Ring buffer sink for host-side consumers

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use dasp_graph::{Buffer, Input};
use rtrb::Producer;

use crate::node::{AudioNode, ProcessContext};

/// A sink that pushes the graph's output into an rtrb ring buffer
///
/// Useful for:
/// - Handing audio to a host callback on another thread
/// - Checking clicks and stream data in tests
///
/// Blocks that do not fit are dropped whole, never written partially.
pub struct RtrbSink {
    producer: Producer<f32>,
    channels: usize,
    dropped: Arc<AtomicUsize>,
}

impl RtrbSink {
    /// Create a sink that writes interleaved samples to the given producer
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            producer,
            channels: channels.max(1),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a sink for mono audio
    pub fn mono(producer: Producer<f32>) -> Self {
        Self::new(producer, 1)
    }

    /// Create a sink for stereo audio
    pub fn stereo(producer: Producer<f32>) -> Self {
        Self::new(producer, 2)
    }

    /// Returns how many sample slots are available
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }

    /// Shared counter of blocks dropped because the ring was full.
    ///
    /// Grab it before handing the sink to the engine.
    pub fn dropped_blocks(&self) -> Arc<AtomicUsize> {
        self.dropped.clone()
    }
}

impl AudioNode for RtrbSink {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let Some(input) = inputs.first() else { return };
        let buffers = input.buffers();
        let Some(first) = buffers.first() else { return };

        let frames = first.len();
        if self.producer.slots() < frames * self.channels {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        for i in 0..frames {
            for ch in 0..self.channels {
                let src_ch = ch.min(buffers.len() - 1);
                let _ = self.producer.push(buffers[src_ch][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
