//! Delay-locked loop for block timestamps.
//!
//! Follows F. Adriaensen, "Using a DLL to filter time" (2005). Each block the
//! loop is fed one raw clock reading and produces a pair of smoothed times:
//! `t0`, the start of the current block, and `t1`, the forecast start of the
//! next one.
//!
//! The update law is a proportional-integral loop with a fixed critical
//! damping:
//!
//! ```text
//! ω  = 2π·B/F
//! b  = √2·ω
//! c  = ω²
//!
//! e  = raw − t1          prediction error of the last forecast
//! t0 = t1                output is always the previous forecast
//! t1 = t1 + b·e + e2
//! e2 = e2 + c·e          slow adaptation of the block period
//! ```
//!
//! All arithmetic is `f64`. A NaN reading poisons the state for good; only a
//! fresh [`Dll`] (i.e. a reconfiguration) starts over.
//!
//! # Example
//!
//! ```
//! use zeitgeber::dll::{Dll, FilterConfig};
//!
//! let config = FilterConfig::new(48_000, 64, 1.0, 0.0);
//! let mut dll = Dll::new(config);
//!
//! assert_eq!(dll.filter(0.0), 0.0);
//! let (t0, t1) = dll.window();
//! assert_eq!(t1 - t0, 64.0 / 48_000.0);
//! ```

use core::f64::consts::{PI, SQRT_2};

use crate::clock::TimeSource;

/// Lower bound for the loop bandwidth in Hz.
pub const MIN_BANDWIDTH: f64 = 1e-6;

/// Bandwidth used when none is configured: `19.2 / fragsize` Hz.
#[inline]
pub fn default_bandwidth(fragsize: usize) -> f64 {
    19.2 / fragsize as f64
}

/// Loop gains `(b, c)` for bandwidth `bandwidth` at block rate `block_rate`.
#[inline]
pub fn coefficients(bandwidth: f64, block_rate: f64) -> (f64, f64) {
    let omega = 2.0 * PI * bandwidth / block_rate;
    (SQRT_2 * omega, omega * omega)
}

/// The fixed part of a loop: signal geometry, gains and output adjustment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterConfig {
    /// Block rate F in Hz.
    pub block_rate: f64,
    /// Loop bandwidth B in Hz.
    pub bandwidth: f64,
    /// Zeroth-order term, always 0.
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Samples per block.
    pub nper: u64,
    /// Nominal block duration in seconds.
    pub tper: f64,
    /// Added to both published times.
    pub adjustment: f64,
}

impl FilterConfig {
    pub fn new(sample_rate: u32, fragsize: usize, bandwidth: f64, adjustment: f64) -> Self {
        let bandwidth = if bandwidth > MIN_BANDWIDTH {
            bandwidth
        } else {
            MIN_BANDWIDTH
        };
        let block_rate = sample_rate as f64 / fragsize as f64;
        let (b, c) = coefficients(bandwidth, block_rate);
        Self {
            block_rate,
            bandwidth,
            a: 0.0,
            b,
            c,
            nper: fragsize as u64,
            tper: fragsize as f64 / sample_rate as f64,
            adjustment,
        }
    }
}

/// The evolving part of a locked loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopState {
    /// Adapted block period.
    pub e2: f64,
    pub t0: f64,
    pub t1: f64,
    /// Sample count at `t0`.
    pub n0: u64,
    /// Sample count at `t1`.
    pub n1: u64,
    /// Last prediction error.
    pub e: f64,
}

/// First block: take the reading as-is and forecast one nominal period ahead.
pub fn init(config: &FilterConfig, raw: f64) -> LoopState {
    let e2 = config.tper;
    LoopState {
        e2,
        t0: raw,
        t1: raw + e2,
        n0: 0,
        n1: config.nper,
        e: 0.0,
    }
}

/// Every later block.
pub fn update(config: &FilterConfig, state: &LoopState, raw: f64) -> LoopState {
    let e = raw - state.t1;
    LoopState {
        e2: state.e2 + config.c * e,
        t0: state.t1,
        t1: state.t1 + (config.b * e + state.e2),
        n0: state.n1,
        n1: state.n1 + config.nper,
        e,
    }
}

/// A loop: its configuration plus its state, `None` until the first block.
#[derive(Clone, Debug)]
pub struct Dll {
    config: FilterConfig,
    state: Option<LoopState>,
}

impl Dll {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> Option<&LoopState> {
        self.state.as_ref()
    }

    /// Whether at least one block has been filtered.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.is_some()
    }

    /// Feed one raw reading, returns the smoothed start of this block.
    pub fn filter(&mut self, raw: f64) -> f64 {
        let next = match &self.state {
            None => init(&self.config, raw),
            Some(state) => update(&self.config, state, raw),
        };
        self.state = Some(next);
        next.t0
    }

    /// Read `source` and filter the reading, returns `(t0, t1)`.
    pub fn process<S: TimeSource + ?Sized>(&mut self, source: &mut S) -> (f64, f64) {
        let raw = source.now();
        self.filter(raw);
        self.window()
    }

    /// `(t0, t1)` of the last filtered block, NaN before the first one.
    #[inline]
    pub fn window(&self) -> (f64, f64) {
        self.state
            .as_ref()
            .map_or((f64::NAN, f64::NAN), |s| (s.t0, s.t1))
    }

    /// `(t0, t1)` with the configured adjustment applied.
    #[inline]
    pub fn adjusted_window(&self) -> (f64, f64) {
        let (t0, t1) = self.window();
        (t0 + self.config.adjustment, t1 + self.config.adjustment)
    }
}
