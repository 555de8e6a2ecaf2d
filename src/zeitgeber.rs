//! High-level engine API

use core::marker::PhantomData;

use crate::graph::AudioGraph;
use crate::node::{AudioNode, NodeId, ProcessContext};
use crate::store::TimingStore;

#[cfg(feature = "cpal_sink")]
use crate::device::CpalDevice;

/// A handle for sending messages to a node in the graph.
///
/// Handles are returned when you add a node to [`Zeitgeber`] and provide two capabilities:
/// 1. **Connections** - Pass handles to [`Zeitgeber::connect`] or [`Zeitgeber::output`]
/// 2. **Messages** - Send replacement configurations via [`Handle::send`]
///
/// # Message Delivery
///
/// Messages are buffered in a lock-free ring buffer and processed at the start
/// of the node's next block. If the buffer is full, [`Handle::send`] returns
/// `Err(msg)` with the message that couldn't be sent, and the node keeps its
/// current configuration.
pub struct Handle<M: Send + 'static> {
    pub(crate) node_id: NodeId,
    pub(crate) sender: rtrb::Producer<M>,
    pub(crate) _marker: PhantomData<M>,
}

impl<M: Send + 'static> Handle<M> {
    /// Send a message to the node.
    ///
    /// The message will be processed at the start of the next block.
    /// This is lock-free and safe to call from any thread.
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    pub fn id(&self) -> NodeId {
        self.node_id
    }
}

/// The engine - owns the graph and the timing store its nodes publish to.
///
/// # Building the Graph
///
/// 1. Add nodes with [`add`](Self::add) - returns a [`Handle`] for connections and messages
/// 2. Connect nodes with [`connect`](Self::connect)
/// 3. Connect the final node to the output with [`output`](Self::output)
///
/// Put the DLL upstream of every node that reads its times. The graph runs
/// inputs first, so that is all it takes for consumers to see this block's
/// `t0`/`t1`.
///
/// ```
/// use zeitgeber::Zeitgeber;
/// use zeitgeber::nodes::{DllNode, DllSettings, RtrbSink, Timestamper, TimestamperSettings};
///
/// let (producer, _consumer) = rtrb::RingBuffer::new(4096);
/// let mut zg = Zeitgeber::new(48_000)
///     .with_channels(1)
///     .with_output(RtrbSink::mono(producer));
/// let ctx = zg.context();
///
/// let raw = TimestamperSettings::default().build(&ctx, zg.store()).unwrap();
/// let raw = zg.add(Timestamper::new(raw));
/// let dll = DllSettings::default().build(&ctx, zg.store()).unwrap();
/// let dll = zg.add(DllNode::new(dll));
///
/// zg.connect(&raw, &dll);
/// zg.output(&dll);
/// zg.process();
///
/// assert!(zg.store().get("dll_t0").is_finite());
/// ```
pub struct Zeitgeber {
    graph: AudioGraph,
    store: TimingStore,
    /// The output sink node (e.g., CpalSink)
    sink_node: Option<NodeId>,
    nodes_added: usize,
    blocks_processed: u64,
}

impl Zeitgeber {
    /// Create an engine at `sample_rate` with stereo geometry and no output sink.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_context(ProcessContext::new(sample_rate, 2))
    }

    pub fn with_context(ctx: ProcessContext) -> Self {
        Self {
            graph: AudioGraph::new(ctx),
            store: TimingStore::new(),
            sink_node: None,
            nodes_added: 0,
            blocks_processed: 0,
        }
    }

    /// Create an engine for the system's default audio output device.
    ///
    /// Returns `None` if no audio device is available.
    #[cfg(feature = "cpal_sink")]
    pub fn default_output() -> Option<Self> {
        let device = CpalDevice::default_output()?;
        let zg = Self::new(device.sample_rate())
            .with_channels(device.channels() as usize)
            .with_output(device.create_sink());
        Some(zg)
    }

    /// Set the number of channels (builder pattern).
    ///
    /// Default is 2. Must be called before any node is added.
    ///
    /// # Panics
    ///
    /// Panics if nodes were already added.
    pub fn with_channels(mut self, channels: usize) -> Self {
        assert!(self.nodes_added == 0, "with_channels() must come before adding nodes");
        let ctx = ProcessContext::new(self.graph.context().sample_rate, channels);
        self.graph = AudioGraph::new(ctx);
        self
    }

    /// Publish into an existing store instead of a private one (builder pattern).
    ///
    /// Lets several engines, or a host that reads the times itself, share
    /// the same named values.
    pub fn with_store(mut self, store: TimingStore) -> Self {
        self.store = store;
        self
    }

    /// Add an output sink (builder pattern).
    pub fn with_output<S: AudioNode<Message = ()>>(mut self, sink: S) -> Self {
        let (id, _) = self.graph.add(sink);
        self.nodes_added += 1;
        self.sink_node = Some(id);
        self.graph.set_terminal(id);
        self
    }

    /// Signal geometry of this engine; pass it to settings `build` calls.
    pub fn context(&self) -> ProcessContext {
        self.graph.context()
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.context().sample_rate
    }

    /// The named store nodes of this engine publish to and read from.
    pub fn store(&self) -> &TimingStore {
        &self.store
    }

    /// Number of blocks processed so far.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// Add a node to the graph.
    ///
    /// Returns a [`Handle`] for connecting the node and sending messages to it.
    pub fn add<N: AudioNode>(&mut self, node: N) -> Handle<N::Message> {
        let (node_id, sender) = self.graph.add(node);
        self.nodes_added += 1;

        Handle {
            node_id,
            sender,
            _marker: PhantomData,
        }
    }

    /// Connect two nodes together.
    ///
    /// Audio flows from `from` to `to`, and `from` is processed first.
    pub fn connect<M1, M2>(&mut self, from: &Handle<M1>, to: &Handle<M2>)
    where
        M1: Send + 'static,
        M2: Send + 'static,
    {
        self.graph.connect(from.node_id, to.node_id);
    }

    /// Connect a node directly to the output sink.
    ///
    /// # Panics
    ///
    /// Panics if no output sink is configured.
    pub fn output<M: Send + 'static>(&mut self, handle: &Handle<M>) {
        let sink_id = self
            .sink_node
            .expect("No output sink configured. Use default_output() or with_output().");
        self.graph.connect(handle.node_id, sink_id);
    }

    /// Process one block.
    ///
    /// Call this once per audio callback (or paced to real time). Every node
    /// upstream of the output runs exactly once, inputs first.
    pub fn process(&mut self) {
        self.graph.process();
        self.blocks_processed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{DllNode, DllSettings, RtrbSink};

    #[test]
    fn engines_can_share_a_store() {
        let store = TimingStore::new();
        let (producer, _consumer) = rtrb::RingBuffer::new(1 << 12);
        let mut zg = Zeitgeber::new(48_000)
            .with_channels(1)
            .with_store(store.clone())
            .with_output(RtrbSink::mono(producer));
        let ctx = zg.context();

        let mut clock = 3.0;
        let step = ctx.block_duration();
        let dll = DllSettings::default().build(&ctx, zg.store()).unwrap();
        let dll = zg.add(DllNode::with_time_source(dll, move || {
            clock += step;
            clock
        }));
        zg.output(&dll);
        zg.process();

        // Visible through the caller's handle, not only the engine's
        assert_eq!(store.get("dll_t0"), 3.0 + step);
        assert!((store.get("dll_t1") - store.get("dll_t0") - step).abs() < 1e-12);
    }
}
