use thiserror::Error;

/// Errors raised while building a configuration object.
///
/// None of these ever surface on the audio thread. When a build fails the
/// node keeps running with whatever configuration it had before.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown clock source \"{0}\"")]
    UnknownClock(String),

    #[error("no stream named \"{name}\" with type \"Audio\", {channels} float32 channels and ~{sample_rate} Hz found")]
    StreamNotFound {
        name: String,
        channels: usize,
        sample_rate: u32,
    },

    #[error("stream \"{0}\" cannot be opened")]
    StreamUnavailable(String),

    #[error("message queue full, configuration not applied")]
    QueueFull,
}
