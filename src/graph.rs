//! Block scheduling for timing nodes
//!
//! Ordering inside a block is what makes published times usable: a DLL has
//! to write `<base>_t0/_t1` before the metronome or stream mapper that reads
//! them runs. The graph gets that from its edges. Every block is pulled from
//! the terminal node, and dasp_graph visits a node only after everything
//! connected into it.

use alloc::vec;

use dasp_graph::{Buffer, BoxedNodeSend, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::graph::NodeIndex;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::node::{AudioNode, NodeId, ProcessContext};

/// Capacity of each node's configuration queue.
const QUEUE_CAPACITY: usize = 64;

/// A node together with the receiving end of its configuration queue.
///
/// Pending messages are handed over at the start of the block, so a new
/// configuration always applies to a whole block.
struct Scheduled<N: AudioNode> {
    node: N,
    inbox: Consumer<N::Message>,
    ctx: ProcessContext,
}

impl<N: AudioNode> dasp_graph::Node for Scheduled<N> {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        let inbox = &mut self.inbox;
        let pending = core::iter::from_fn(|| inbox.pop().ok());
        self.node.process(&self.ctx, pending, inputs, outputs);
    }
}

type Topology = petgraph::graph::Graph<NodeData<BoxedNodeSend>, ()>;

/// Timing nodes wired by data dependency.
///
/// An edge `from → to` carries audio and also means "`from` publishes before
/// `to` reads". Nodes not upstream of the terminal never run.
pub(crate) struct AudioGraph {
    topology: Topology,
    processor: Processor<Topology>,
    ctx: ProcessContext,
    indices: HashMap<NodeId, NodeIndex>,
    terminal: Option<NodeIndex>,
}

impl AudioGraph {
    pub fn new(ctx: ProcessContext) -> Self {
        Self {
            topology: Topology::with_capacity(16, 16),
            processor: Processor::with_capacity(16),
            ctx,
            indices: HashMap::new(),
            terminal: None,
        }
    }

    pub fn context(&self) -> ProcessContext {
        self.ctx
    }

    /// Insert `node` and return its id and the sending end of its queue.
    pub fn add<N: AudioNode>(&mut self, node: N) -> (NodeId, Producer<N::Message>) {
        let id = NodeId(self.indices.len() as u32);
        let (outbox, inbox) = RingBuffer::new(QUEUE_CAPACITY);

        // Sinks publish nothing but dasp_graph wants one output buffer anyway
        let buffers = vec![Buffer::SILENT; node.num_outputs().max(1)];
        let scheduled = Scheduled {
            node,
            inbox,
            ctx: self.ctx,
        };
        let index = self
            .topology
            .add_node(NodeData::new(BoxedNodeSend::new(scheduled), buffers));
        self.indices.insert(id, index);

        (id, outbox)
    }

    /// `from` runs before `to` and feeds it audio.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.topology.add_edge(self.indices[&from], self.indices[&to], ());
    }

    pub fn set_terminal(&mut self, id: NodeId) {
        self.terminal = Some(self.indices[&id]);
    }

    /// Run one block: the terminal and, before it, everything it depends on.
    pub fn process(&mut self) {
        if let Some(terminal) = self.terminal {
            self.processor.process(&mut self.topology, terminal);
        }
    }
}
