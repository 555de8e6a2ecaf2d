//! In-process stream transport.
//!
//! Outlets and inlets created from the same [`LoopbackBus`] talk over a pair
//! of SPSC rings per stream, one for interleaved samples and one for
//! timestamps. Each outlet can be opened by exactly one inlet.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, trace};

use super::{StreamInfo, StreamInlet, StreamOutlet, StreamProvider, StreamResolver};
use crate::error::ConfigError;

/// Frames an outlet buffers before it starts dropping chunks.
pub const DEFAULT_BUFFER_FRAMES: usize = 1 << 15;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Entry {
    info: StreamInfo,
    /// Receiving ends, until an inlet takes them.
    receiver: Option<(Consumer<f32>, Consumer<f64>)>,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<Vec<Entry>>,
    next_uid: AtomicU64,
}

impl Registry {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A process-local "network" of streams.
///
/// Cloning gives another handle to the same bus.
///
/// ```
/// use zeitgeber::stream::{LoopbackBus, StreamInfo, StreamInlet, StreamOutlet, StreamProvider, StreamResolver};
/// use zeitgeber::ProcessContext;
/// use std::time::Duration;
///
/// let bus = LoopbackBus::new();
/// let ctx = ProcessContext::new(48_000, 1);
/// let mut outlet = bus.create_outlet(StreamInfo::audio("mic", "", &ctx), 64).unwrap();
///
/// let found = bus.resolve("mic", Duration::ZERO);
/// let mut inlet = bus.open_inlet(&found[0], 64).unwrap();
///
/// outlet.push_chunk(&[0.5, 0.25], &[1.0, 1.1]);
/// let (mut samples, mut stamps) = ([0.0; 4], [0.0; 4]);
/// assert_eq!(inlet.pull_chunk(&mut samples, &mut stamps), 2);
/// assert_eq!(stamps[..2], [1.0, 1.1]);
/// ```
#[derive(Clone)]
pub struct LoopbackBus {
    registry: Arc<Registry>,
    buffer_frames: usize,
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::with_buffer_frames(DEFAULT_BUFFER_FRAMES)
    }

    /// A bus whose outlets buffer up to `frames` frames each.
    pub fn with_buffer_frames(frames: usize) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            buffer_frames: frames.max(1),
        }
    }

    /// Every stream currently published on this bus.
    pub fn streams(&self) -> Vec<StreamInfo> {
        self.registry.entries().iter().map(|e| e.info.clone()).collect()
    }
}

impl StreamProvider for LoopbackBus {
    type Outlet = LoopbackOutlet;

    fn create_outlet(&self, mut info: StreamInfo, chunk_frames: usize) -> Result<LoopbackOutlet, ConfigError> {
        let channels = info.channel_count.max(1);
        let frames = self.buffer_frames.max(chunk_frames);
        let (samples, sample_rx) = RingBuffer::new(frames * channels);
        let (timestamps, timestamp_rx) = RingBuffer::new(frames);

        info.uid = self.registry.next_uid.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            name = %info.name,
            source_id = %info.source_id,
            uid = info.uid,
            channels,
            srate = info.nominal_srate,
            "publishing loopback outlet"
        );

        let uid = info.uid;
        self.registry.entries().push(Entry {
            info,
            receiver: Some((sample_rx, timestamp_rx)),
        });

        Ok(LoopbackOutlet {
            samples,
            timestamps,
            channels,
            uid,
            dropped: Arc::new(AtomicUsize::new(0)),
            registry: self.registry.clone(),
        })
    }
}

impl StreamResolver for LoopbackBus {
    type Inlet = LoopbackInlet;

    fn resolve(&self, name: &str, timeout: Duration) -> Vec<StreamInfo> {
        let deadline = Instant::now() + timeout;
        loop {
            let found: Vec<StreamInfo> = self
                .registry
                .entries()
                .iter()
                .filter(|e| e.info.name == name)
                .map(|e| e.info.clone())
                .collect();

            if !found.is_empty() || Instant::now() >= deadline {
                debug!(name, found = found.len(), "resolved loopback streams");
                return found;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn open_inlet(&self, info: &StreamInfo, _max_chunk_frames: usize) -> Result<LoopbackInlet, ConfigError> {
        let mut entries = self.registry.entries();
        let (samples, timestamps) = entries
            .iter_mut()
            .find(|e| e.info.uid == info.uid)
            .and_then(|e| e.receiver.take())
            .ok_or_else(|| ConfigError::StreamUnavailable(info.name.clone()))?;

        debug!(name = %info.name, uid = info.uid, "opened loopback inlet");
        Ok(LoopbackInlet {
            samples,
            timestamps,
            channels: info.channel_count.max(1),
        })
    }
}

/// Sending end of a loopback stream. Unpublishes the stream when dropped.
pub struct LoopbackOutlet {
    samples: Producer<f32>,
    timestamps: Producer<f64>,
    channels: usize,
    uid: u64,
    dropped: Arc<AtomicUsize>,
    registry: Arc<Registry>,
}

impl LoopbackOutlet {
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Chunks discarded because the reader fell behind.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl StreamOutlet for LoopbackOutlet {
    fn push_chunk(&mut self, samples: &[f32], timestamps: &[f64]) {
        let frames = timestamps.len().min(samples.len() / self.channels);
        if self.timestamps.slots() < frames || self.samples.slots() < frames * self.channels {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(uid = self.uid, frames, "loopback outlet full, dropping chunk");
            return;
        }

        // Samples first: a visible timestamp implies its frame is complete
        for &sample in &samples[..frames * self.channels] {
            let _ = self.samples.push(sample);
        }
        for &timestamp in &timestamps[..frames] {
            let _ = self.timestamps.push(timestamp);
        }
    }
}

impl Drop for LoopbackOutlet {
    fn drop(&mut self) {
        self.registry.entries().retain(|e| e.info.uid != self.uid);
    }
}

/// Receiving end of a loopback stream.
pub struct LoopbackInlet {
    samples: Consumer<f32>,
    timestamps: Consumer<f64>,
    channels: usize,
}

impl StreamInlet for LoopbackInlet {
    fn pull_chunk(&mut self, samples: &mut [f32], timestamps: &mut [f64]) -> usize {
        let frames = self
            .timestamps
            .slots()
            .min(timestamps.len())
            .min(samples.len() / self.channels);

        for (k, timestamp) in timestamps[..frames].iter_mut().enumerate() {
            *timestamp = self.timestamps.pop().unwrap_or(f64::NAN);
            for sample in &mut samples[k * self.channels..(k + 1) * self.channels] {
                *sample = self.samples.pop().unwrap_or(0.0);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ProcessContext;

    fn info(name: &str) -> StreamInfo {
        StreamInfo::audio(name, "test", &ProcessContext::new(48_000, 2))
    }

    #[test]
    fn resolves_by_name_only() {
        let bus = LoopbackBus::new();
        let _a = bus.create_outlet(info("a"), 64).unwrap();
        let _b = bus.create_outlet(info("b"), 64).unwrap();

        let found = bus.resolve("b", Duration::ZERO);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "b");
        assert_ne!(found[0].uid, 0);
        assert!(bus.resolve("c", Duration::from_millis(20)).is_empty());
    }

    #[test]
    fn resolve_waits_for_late_outlet() {
        let bus = LoopbackBus::new();
        let publisher = bus.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            publisher.create_outlet(info("late"), 64).unwrap()
        });

        let found = bus.resolve("late", Duration::from_secs(5));
        let _outlet = thread.join().unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn inlet_can_be_opened_once() {
        let bus = LoopbackBus::new();
        let _outlet = bus.create_outlet(info("once"), 64).unwrap();
        let found = bus.resolve("once", Duration::ZERO);

        assert!(bus.open_inlet(&found[0], 64).is_ok());
        assert!(matches!(
            bus.open_inlet(&found[0], 64),
            Err(ConfigError::StreamUnavailable(name)) if name == "once"
        ));
    }

    #[test]
    fn pulls_interleaved_frames_in_order() {
        let bus = LoopbackBus::new();
        let mut outlet = bus.create_outlet(info("s"), 4).unwrap();
        let mut inlet = bus.open_inlet(&bus.resolve("s", Duration::ZERO)[0], 4).unwrap();

        outlet.push_chunk(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], &[0.1, 0.2, 0.3]);

        let mut samples = [0.0; 4];
        let mut stamps = [0.0; 2];
        assert_eq!(inlet.pull_chunk(&mut samples, &mut stamps), 2);
        assert_eq!(samples, [1.0, -1.0, 2.0, -2.0]);
        assert_eq!(stamps, [0.1, 0.2]);

        assert_eq!(inlet.pull_chunk(&mut samples, &mut stamps), 1);
        assert_eq!(samples[..2], [3.0, -3.0]);
        assert_eq!(stamps[0], 0.3);

        assert_eq!(inlet.pull_chunk(&mut samples, &mut stamps), 0);
    }

    #[test]
    fn full_outlet_drops_whole_chunks() {
        let bus = LoopbackBus::with_buffer_frames(4);
        let mut outlet = bus.create_outlet(info("s"), 4).unwrap();

        outlet.push_chunk(&[0.0; 6], &[0.0; 3]);
        outlet.push_chunk(&[0.0; 4], &[0.0; 2]);
        assert_eq!(outlet.dropped_chunks(), 1);
    }

    #[test]
    fn dropping_outlet_unpublishes() {
        let bus = LoopbackBus::new();
        let outlet = bus.create_outlet(info("gone"), 64).unwrap();
        assert_eq!(bus.streams().len(), 1);
        drop(outlet);
        assert!(bus.streams().is_empty());
    }
}
