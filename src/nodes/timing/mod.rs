//! Timing nodes - pass audio through, publish block times

mod dll;
mod timestamper;

pub use dll::{DllConfig, DllMessage, DllNode, DllSettings};
pub use timestamper::{Timestamper, TimestamperConfig, TimestamperMessage, TimestamperSettings};
