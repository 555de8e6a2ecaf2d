//! # Zeitgeber
//!
//! Smooth, sample-accurate block timestamps for real-time audio graphs.
//!
//! Every audio callback sees a noisy wall-clock reading: the OS scheduler and
//! buffer queuing add jitter of a good fraction of a block. Zeitgeber runs a
//! second-order delay-locked loop over those readings and publishes, for each
//! block, a smoothed start time `t0` and the forecast start time of the next
//! block `t1`. Downstream nodes read that pair once per block to
//!
//! - splice a metronome click in at exactly the right sample ([`nodes::Metronome`]),
//! - timestamp every outgoing sample of a network stream ([`nodes::StreamOutput`]),
//! - place samples of an independently clocked incoming stream on the host's
//!   timeline ([`nodes::StreamInput`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use zeitgeber::Zeitgeber;
//! use zeitgeber::nodes::{DllNode, DllSettings, Metronome, MetronomeSettings};
//!
//! let mut zg = Zeitgeber::new(48_000).with_channels(1);
//! let ctx = zg.context();
//!
//! let dll = DllSettings {
//!     clock_source: "CLOCK_MONOTONIC".into(),
//!     ..Default::default()
//! };
//! let dll = zg.add(DllNode::new(dll.build(&ctx, zg.store()).unwrap()));
//!
//! let click = MetronomeSettings { bpm: 120.0, ..Default::default() };
//! let click = zg.add(Metronome::new(click.build(&ctx, zg.store())));
//!
//! // The DLL has to sit upstream of everything that reads its times
//! zg.connect(&dll, &click);
//! ```
//!
//! ## Ordering
//!
//! Nodes are processed in graph order from the output backwards, so a consumer
//! always sees the `t0`/`t1` its upstream DLL published for the same block.
//! Consumers never modify the loop; a NaN or reversed window only makes the
//! consumer fall back to pass-through or silence for that block.
//!
//! ## Reconfiguration
//!
//! Configuration objects are built off the audio thread and sent through the
//! node's [`Handle`]; the node swaps them in at the next block boundary.
//! [`Controller`] adds change detection on top of that.

extern crate alloc;

mod clock;
mod controller;
mod device;
mod error;
mod graph;
mod node;
mod store;
mod zeitgeber;

pub mod dll;
pub mod nodes;
pub mod stream;

pub use clock::{ClockId, TimeSource};
pub use controller::Controller;
pub use device::CpalDevice;
pub use error::ConfigError;
pub use node::{AudioNode, NodeId, ProcessContext};
pub use store::{TimeSlot, TimeWindow, TimingStore};
pub use zeitgeber::{Handle, Zeitgeber};

// Re-export dasp_graph types needed for custom nodes
pub use dasp_graph::{Buffer, Input};
