//! Source nodes - produce audio (no inputs required)

mod rtrb_source;
mod stream_inlet;

pub use rtrb_source::RtrbSource;
pub use stream_inlet::{InletReader, StreamInput, StreamInputConfig, StreamInputMessage, StreamInputSettings};
