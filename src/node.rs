//! Core node trait and context types.

use dasp_graph::{Buffer, Input};

/// Signal geometry available during configuration and processing.
///
/// Passed to every [`AudioNode::process`] call and to every settings
/// `build`. `buffer_size` is the number of frames per block (the fragment
/// size), which inside a graph is always [`Buffer::LEN`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of frames per block
    pub buffer_size: usize,
    /// Number of audio channels flowing through the graph
    pub channels: usize,
}

impl ProcessContext {
    /// Geometry of a graph running at `sample_rate` with `channels` channels.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            buffer_size: Buffer::LEN,
            channels,
        }
    }

    /// Nominal duration of one block in seconds.
    #[inline]
    pub fn block_duration(&self) -> f64 {
        self.buffer_size as f64 / self.sample_rate as f64
    }
}

/// Unique identifier for a node within a graph.
///
/// You typically don't interact with this directly - use [`Handle`](crate::Handle) instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// The core trait for nodes in a timing graph.
///
/// Timing nodes are ordinary audio nodes: a DLL or timestamper passes audio
/// through and publishes times as a side effect, a metronome rewrites its
/// input, a stream inlet replaces it.
///
/// # Message-Based Reconfiguration
///
/// Nodes never share mutable configuration with the control thread. A new
/// configuration is built elsewhere and arrives as a message; drain the
/// messages at the start of `process()` and swap the new object in:
///
/// ```
/// use zeitgeber::{AudioNode, ProcessContext, Buffer, Input};
///
/// enum OffsetMessage {
///     SetOffset(f32),
/// }
///
/// struct Offset {
///     offset: f32,
/// }
///
/// impl AudioNode for Offset {
///     type Message = OffsetMessage;
///
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         messages: impl Iterator<Item = OffsetMessage>,
///         inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         for msg in messages {
///             match msg {
///                 OffsetMessage::SetOffset(o) => self.offset = o,
///             }
///         }
///
///         let Some(input) = inputs.first() else { return };
///         for (out, inp) in outputs.iter_mut().zip(input.buffers()) {
///             for (o, i) in out.iter_mut().zip(inp.iter()) {
///                 *o = *i + self.offset;
///             }
///         }
///     }
///
///     fn num_inputs(&self) -> usize { 1 }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Message type for configuration updates.
    ///
    /// Use a custom enum for nodes with parameters, or `()` for nodes without.
    type Message: Send + 'static;

    /// Process one block of audio.
    ///
    /// Called once per block. Your implementation should:
    /// 1. Drain and handle all pending messages
    /// 2. Read from `inputs` (if any)
    /// 3. Write to `outputs`
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Number of audio input channels (0 for sources).
    fn num_inputs(&self) -> usize { 0 }

    /// Number of audio output channels.
    fn num_outputs(&self) -> usize { 1 }
}

/// Copy the first input to `outputs`, channel by channel.
///
/// Missing input channels repeat the last one; no input at all is silence.
pub(crate) fn pass_through(inputs: &[Input], outputs: &mut [Buffer]) {
    let in_buffers = inputs.first().map_or(&[][..], |input| input.buffers());

    for (ch, out_buffer) in outputs.iter_mut().enumerate() {
        match in_buffers.get(ch).or_else(|| in_buffers.last()) {
            Some(in_buffer) => out_buffer.copy_from_slice(in_buffer),
            None => out_buffer.iter_mut().for_each(|s| *s = 0.0),
        }
    }
}
