//! Sink nodes - consume audio (inputs → external)

mod rtrb_sink;
mod stream_outlet;

#[cfg(feature = "cpal_sink")]
mod cpal_sink;

pub use rtrb_sink::RtrbSink;
pub use stream_outlet::{block_timestamps, StreamOutput, StreamOutputConfig, StreamOutputMessage, StreamOutputSettings};

#[cfg(feature = "cpal_sink")]
pub use cpal_sink::CpalSink;
