//! Named timing values shared between independent nodes.
//!
//! Names are resolved to [`TimeSlot`]s once, when a configuration is built.
//! The audio path only ever touches the slots, which are plain atomics.

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use hashbrown::HashMap;
use tracing::debug;

/// A stable handle to one published `f64` value.
///
/// Slots that have never been written read as NaN.
#[derive(Clone, Debug)]
pub struct TimeSlot(Arc<AtomicU64>);

impl TimeSlot {
    fn new() -> Self {
        Self(Arc::new(AtomicU64::new(f64::NAN.to_bits())))
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Whether both handles refer to the same stored value.
    pub fn same_as(&self, other: &TimeSlot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The `<base>_t0` / `<base>_t1` pair a DLL publishes each block.
#[derive(Clone, Debug)]
pub struct TimeWindow {
    pub t0: TimeSlot,
    pub t1: TimeSlot,
}

impl TimeWindow {
    /// Smoothed start of the current block and forecast start of the next one.
    #[inline]
    pub fn read(&self) -> (f64, f64) {
        (self.t0.get(), self.t1.get())
    }

    #[inline]
    pub fn publish(&self, t0: f64, t1: f64) {
        self.t0.set(t0);
        self.t1.set(t1);
    }
}

/// Process-wide registry of named timing values.
///
/// Cloning gives another handle to the same registry.
#[derive(Clone, Default)]
pub struct TimingStore {
    slots: Arc<Mutex<HashMap<String, TimeSlot>>>,
}

impl TimingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot for `name`, creating it (reading NaN) if nobody has yet.
    pub fn slot(&self, name: &str) -> TimeSlot {
        // A poisoned registry still holds valid slots, keep using it
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(name) {
            return slot.clone();
        }
        debug!(name, "registering timing slot");
        let slot = TimeSlot::new();
        slots.insert(name.into(), slot.clone());
        slot
    }

    /// Resolve the `<base>_t0` and `<base>_t1` pair.
    pub fn window(&self, base: &str) -> TimeWindow {
        TimeWindow {
            t0: self.slot(&format!("{base}_t0")),
            t1: self.slot(&format!("{base}_t1")),
        }
    }

    /// Current value of `name`, NaN if it has never been published.
    pub fn get(&self, name: &str) -> f64 {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(name).map_or(f64::NAN, TimeSlot::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_slots_read_nan() {
        let store = TimingStore::new();
        assert!(store.get("dll_t0").is_nan());
        assert!(store.slot("dll_t0").get().is_nan());
    }

    #[test]
    fn same_name_resolves_to_same_slot() {
        let store = TimingStore::new();
        let a = store.slot("clock");
        let b = store.clone().slot("clock");
        assert!(a.same_as(&b));

        a.set(12.5);
        assert_eq!(b.get(), 12.5);
        assert_eq!(store.get("clock"), 12.5);
    }

    #[test]
    fn window_uses_suffixed_names() {
        let store = TimingStore::new();
        let window = store.window("dll");
        window.publish(1.0, 2.0);
        assert_eq!(store.get("dll_t0"), 1.0);
        assert_eq!(store.get("dll_t1"), 2.0);
        assert_eq!(window.read(), (1.0, 2.0));
    }
}
