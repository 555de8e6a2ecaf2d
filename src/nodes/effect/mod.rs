//! Effect nodes - process audio (inputs → outputs)

mod metronome;

pub use metronome::{
    splice_offset, BeatScheduler, ClickWaveform, FutureRing, Metronome, MetronomeConfig,
    MetronomeMessage, MetronomeSettings,
};
