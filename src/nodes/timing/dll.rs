//! Delay-locked loop node

use alloc::boxed::Box;
use alloc::string::String;

use dasp_graph::{Buffer, Input};
use tracing::debug;

use crate::clock::{ClockId, TimeSource};
use crate::dll::{default_bandwidth, Dll, FilterConfig};
use crate::error::ConfigError;
use crate::node::{pass_through, AudioNode, ProcessContext};
use crate::nodes::same_f64;
use crate::store::{TimeWindow, TimingStore};

/// User-facing parameters of a [`DllNode`].
#[derive(Clone, Debug)]
pub struct DllSettings {
    /// Base name of the published values, `<name>_t0` and `<name>_t1`.
    pub name: String,
    /// Loop bandwidth in Hz. NaN selects `19.2 / fragsize`.
    pub bandwidth: f64,
    /// One of the `CLOCK_*` names understood by [`ClockId`].
    pub clock_source: String,
    /// Seconds added to both published times.
    pub adjustment: f64,
}

impl Default for DllSettings {
    fn default() -> Self {
        Self {
            name: "dll".into(),
            bandwidth: f64::NAN,
            clock_source: ClockId::Realtime.name().into(),
            adjustment: 0.0,
        }
    }
}

impl PartialEq for DllSettings {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && same_f64(self.bandwidth, other.bandwidth)
            && self.clock_source == other.clock_source
            && same_f64(self.adjustment, other.adjustment)
    }
}

impl DllSettings {
    /// Build a fresh, unlocked loop for the given geometry.
    pub fn build(&self, ctx: &ProcessContext, store: &TimingStore) -> Result<DllConfig, ConfigError> {
        let clock: ClockId = self.clock_source.parse()?;
        let bandwidth = if self.bandwidth.is_nan() {
            default_bandwidth(ctx.buffer_size)
        } else {
            self.bandwidth
        };

        let filter = FilterConfig::new(ctx.sample_rate, ctx.buffer_size, bandwidth, self.adjustment);
        debug!(
            name = %self.name,
            %clock,
            bandwidth = filter.bandwidth,
            b = filter.b,
            c = filter.c,
            "built dll configuration"
        );

        Ok(DllConfig {
            dll: Dll::new(filter),
            clock,
            window: store.window(&self.name),
            channels: ctx.channels,
        })
    }
}

/// A complete loop configuration: filter, clock and where to publish.
pub struct DllConfig {
    dll: Dll,
    clock: ClockId,
    window: TimeWindow,
    channels: usize,
}

impl DllConfig {
    pub fn dll(&self) -> &Dll {
        &self.dll
    }

    pub fn clock(&self) -> ClockId {
        self.clock
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }
}

/// Messages to reconfigure a [`DllNode`]
pub enum DllMessage {
    /// Replace the loop. The new loop starts unlocked.
    Configure(Box<DllConfig>),
}

impl DllMessage {
    pub fn configure(config: DllConfig) -> Self {
        DllMessage::Configure(Box::new(config))
    }
}

/// Reads the clock once per block, runs the loop and publishes `t0`/`t1`.
///
/// Audio passes through unchanged. Connect this node upstream of every node
/// that reads its times.
pub struct DllNode<C: TimeSource = ClockId> {
    config: DllConfig,
    source: C,
}

impl DllNode<ClockId> {
    /// A node reading the clock named in `config`.
    pub fn new(config: DllConfig) -> Self {
        let source = config.clock;
        Self { config, source }
    }
}

impl<C: TimeSource> DllNode<C> {
    /// A node reading `source` instead of a system clock.
    pub fn with_time_source(config: DllConfig, source: C) -> Self {
        Self { config, source }
    }

    pub fn dll(&self) -> &Dll {
        &self.config.dll
    }

    fn reconfigure(&mut self, config: DllConfig) {
        if !config.window.t0.same_as(&self.config.window.t0) {
            // Renamed: the old names must not keep a stale time
            self.config.window.publish(f64::NAN, f64::NAN);
        }
        self.source.select(config.clock);
        self.config = config;
    }

    /// Run one block without audio. Returns the published `(t0, t1)`.
    pub fn tick(&mut self) -> (f64, f64) {
        self.config.dll.process(&mut self.source);
        let (t0, t1) = self.config.dll.adjusted_window();
        self.config.window.publish(t0, t1);
        (t0, t1)
    }
}

impl<C: TimeSource> AudioNode for DllNode<C> {
    type Message = DllMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = DllMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                DllMessage::Configure(config) => self.reconfigure(*config),
            }
        }

        self.tick();
        pass_through(inputs, outputs);
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { self.config.channels }
}
