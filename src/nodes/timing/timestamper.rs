//! Raw timestamp publisher

use alloc::boxed::Box;
use alloc::string::String;

use dasp_graph::{Buffer, Input};
use tracing::debug;

use crate::clock::{ClockId, TimeSource};
use crate::error::ConfigError;
use crate::node::{pass_through, AudioNode, ProcessContext};
use crate::store::{TimeSlot, TimingStore};

/// User-facing parameters of a [`Timestamper`].
#[derive(Clone, Debug, PartialEq)]
pub struct TimestamperSettings {
    /// Name the reading is published under.
    pub name: String,
    /// One of the `CLOCK_*` names understood by [`ClockId`].
    pub clock_source: String,
}

impl Default for TimestamperSettings {
    fn default() -> Self {
        Self {
            name: "timestamper".into(),
            clock_source: ClockId::Realtime.name().into(),
        }
    }
}

impl TimestamperSettings {
    pub fn build(&self, ctx: &ProcessContext, store: &TimingStore) -> Result<TimestamperConfig, ConfigError> {
        let clock: ClockId = self.clock_source.parse()?;
        debug!(name = %self.name, %clock, "built timestamper configuration");
        Ok(TimestamperConfig {
            clock,
            slot: store.slot(&self.name),
            channels: ctx.channels,
        })
    }
}

pub struct TimestamperConfig {
    clock: ClockId,
    slot: TimeSlot,
    channels: usize,
}

/// Messages to reconfigure a [`Timestamper`]
pub enum TimestamperMessage {
    Configure(Box<TimestamperConfig>),
}

impl TimestamperMessage {
    pub fn configure(config: TimestamperConfig) -> Self {
        TimestamperMessage::Configure(Box::new(config))
    }
}

/// Publishes the unfiltered clock reading of every block.
///
/// Useful next to a [`DllNode`](crate::nodes::DllNode) to see how much jitter
/// the loop is removing. A failed clock read publishes NaN.
pub struct Timestamper<C: TimeSource = ClockId> {
    config: TimestamperConfig,
    source: C,
}

impl Timestamper<ClockId> {
    pub fn new(config: TimestamperConfig) -> Self {
        let source = config.clock;
        Self { config, source }
    }
}

impl<C: TimeSource> Timestamper<C> {
    pub fn with_time_source(config: TimestamperConfig, source: C) -> Self {
        Self { config, source }
    }
}

impl<C: TimeSource> AudioNode for Timestamper<C> {
    type Message = TimestamperMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = TimestamperMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                TimestamperMessage::Configure(config) => {
                    if !config.slot.same_as(&self.config.slot) {
                        // Renamed: the old name must not keep a stale reading
                        self.config.slot.set(f64::NAN);
                    }
                    self.source.select(config.clock);
                    self.config = *config;
                }
            }
        }

        self.config.slot.set(self.source.now());
        pass_through(inputs, outputs);
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { self.config.channels }
}
