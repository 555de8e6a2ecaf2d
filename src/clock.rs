//! Clock sources for unfiltered block timestamps.

use core::fmt;
use core::str::FromStr;

use crate::error::ConfigError;

/// Something that can be asked for the current time once per block.
///
/// Readings are seconds as `f64`. A failed read is reported as NaN, never as
/// an error, so the audio path keeps running.
///
/// Closures implement this too, which is handy for hosts that already have a
/// timestamp for the callback (and for tests):
///
/// ```
/// use zeitgeber::TimeSource;
///
/// let mut t = 0.0;
/// let mut source = move || { t += 0.5; t };
/// assert_eq!(source.now(), 0.5);
/// ```
pub trait TimeSource: Send + 'static {
    fn now(&mut self) -> f64;

    /// Called when a new configuration names a clock. Sources that are not a
    /// system clock ignore it.
    fn select(&mut self, _clock: ClockId) {}
}

impl<F> TimeSource for F
where
    F: FnMut() -> f64 + Send + 'static,
{
    #[inline]
    fn now(&mut self) -> f64 {
        self()
    }
}

/// The clocks `clock_gettime` knows about.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ClockId {
    #[default]
    Realtime,
    RealtimeCoarse,
    Monotonic,
    MonotonicCoarse,
    MonotonicRaw,
    Boottime,
    ProcessCputime,
    ThreadCputime,
}

impl ClockId {
    pub const ALL: [ClockId; 8] = [
        ClockId::Realtime,
        ClockId::RealtimeCoarse,
        ClockId::Monotonic,
        ClockId::MonotonicCoarse,
        ClockId::MonotonicRaw,
        ClockId::Boottime,
        ClockId::ProcessCputime,
        ClockId::ThreadCputime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClockId::Realtime => "CLOCK_REALTIME",
            ClockId::RealtimeCoarse => "CLOCK_REALTIME_COARSE",
            ClockId::Monotonic => "CLOCK_MONOTONIC",
            ClockId::MonotonicCoarse => "CLOCK_MONOTONIC_COARSE",
            ClockId::MonotonicRaw => "CLOCK_MONOTONIC_RAW",
            ClockId::Boottime => "CLOCK_BOOTTIME",
            ClockId::ProcessCputime => "CLOCK_PROCESS_CPUTIME_ID",
            ClockId::ThreadCputime => "CLOCK_THREAD_CPUTIME_ID",
        }
    }

    /// Read the clock in seconds, or NaN if the read failed.
    #[cfg(target_os = "linux")]
    pub fn read(self) -> f64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, exclusively borrowed timespec for the call.
        let rc = unsafe { libc::clock_gettime(self.raw(), &mut ts) };
        if rc == 0 {
            ts.tv_sec as f64 + ts.tv_nsec as f64 * 1e-9
        } else {
            f64::NAN
        }
    }

    #[cfg(target_os = "linux")]
    fn raw(self) -> libc::clockid_t {
        match self {
            ClockId::Realtime => libc::CLOCK_REALTIME,
            ClockId::RealtimeCoarse => libc::CLOCK_REALTIME_COARSE,
            ClockId::Monotonic => libc::CLOCK_MONOTONIC,
            ClockId::MonotonicCoarse => libc::CLOCK_MONOTONIC_COARSE,
            ClockId::MonotonicRaw => libc::CLOCK_MONOTONIC_RAW,
            ClockId::Boottime => libc::CLOCK_BOOTTIME,
            ClockId::ProcessCputime => libc::CLOCK_PROCESS_CPUTIME_ID,
            ClockId::ThreadCputime => libc::CLOCK_THREAD_CPUTIME_ID,
        }
    }

    /// Read the clock in seconds, or NaN if the read failed.
    ///
    /// Off Linux only wall and monotonic time are available; the CPU-time
    /// clocks always read NaN.
    #[cfg(not(target_os = "linux"))]
    pub fn read(self) -> f64 {
        use std::sync::OnceLock;
        use std::time::{Instant, SystemTime, UNIX_EPOCH};

        static ANCHOR: OnceLock<Instant> = OnceLock::new();

        match self {
            ClockId::Realtime | ClockId::RealtimeCoarse => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(f64::NAN),
            ClockId::Monotonic
            | ClockId::MonotonicCoarse
            | ClockId::MonotonicRaw
            | ClockId::Boottime => ANCHOR.get_or_init(Instant::now).elapsed().as_secs_f64(),
            ClockId::ProcessCputime | ClockId::ThreadCputime => f64::NAN,
        }
    }
}

impl TimeSource for ClockId {
    #[inline]
    fn now(&mut self) -> f64 {
        self.read()
    }

    fn select(&mut self, clock: ClockId) {
        *self = clock;
    }
}

impl FromStr for ClockId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClockId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| ConfigError::UnknownClock(s.into()))
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
