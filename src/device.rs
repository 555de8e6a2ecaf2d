//! CPAL device discovery and sink creation.
//!
//! Without the `cpal_sink` feature there are no devices: [`CpalDevice::default_output`]
//! returns `None` and [`CpalDevice::list_outputs`] is empty, so a host can
//! probe for audio output without caring how the crate was built.
//!
//! # Example: Pick a Device for a Metronome
//!
//! ```no_run
//! use zeitgeber::{CpalDevice, Zeitgeber};
//!
//! for (i, device) in CpalDevice::list_outputs().iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)",
//!         i, device.name(), device.sample_rate(), device.channels());
//! }
//!
//! if let Some(device) = CpalDevice::default_output() {
//!     let zg = Zeitgeber::new(device.sample_rate())
//!         .with_channels(device.channels() as usize);
//! #   let _ = zg;
//! }
//! ```

use alloc::string::String;
use alloc::vec::Vec;

#[cfg(feature = "cpal_sink")]
use cpal::traits::{DeviceTrait, HostTrait};
#[cfg(feature = "cpal_sink")]
use tracing::debug;

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default, or
/// [`CpalDevice::list_outputs`] to enumerate all available devices.
///
/// Once you have a device, use [`create_sink`](Self::create_sink) to create
/// a [`CpalSink`](crate::nodes::CpalSink) node for audio output.
pub struct CpalDevice {
    #[cfg(feature = "cpal_sink")]
    device: cpal::Device,
    #[cfg(feature = "cpal_sink")]
    config: cpal::SupportedStreamConfig,

    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalDevice {
    /// Get the system's default output device.
    ///
    /// Returns `None` if no audio device is available.
    #[cfg(feature = "cpal_sink")]
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        debug!(%name, sample_rate = config.sample_rate().0, channels = config.channels(), "default output device");

        Some(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
            device,
            config,
        })
    }

    #[cfg(not(feature = "cpal_sink"))]
    pub fn default_output() -> Option<Self> {
        None
    }

    /// List all available audio output devices.
    ///
    /// Returns an empty list if no devices are found or if enumeration fails.
    #[cfg(feature = "cpal_sink")]
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| {
                devices.filter_map(|device| {
                    let config = device.default_output_config().ok()?;
                    let name = device.name().unwrap_or_else(|_| "Unknown".into());
                    Some(Self {
                        sample_rate: config.sample_rate().0,
                        channels: config.channels(),
                        name,
                        device,
                        config,
                    })
                }).collect()
            })
            .unwrap_or_default()
    }

    #[cfg(not(feature = "cpal_sink"))]
    pub fn list_outputs() -> Vec<Self> {
        Vec::new()
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device's sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Create a sink node that outputs audio to this device.
    ///
    /// Hand the returned [`CpalSink`](crate::nodes::CpalSink) to
    /// [`Zeitgeber::with_output`](crate::Zeitgeber::with_output).
    #[cfg(feature = "cpal_sink")]
    pub fn create_sink(&self) -> crate::nodes::CpalSink {
        crate::nodes::CpalSink::new(&self.device, &self.config)
    }
}

#[cfg(all(test, not(feature = "cpal_sink")))]
mod tests {
    use super::*;

    #[test]
    fn no_devices_without_backend() {
        assert!(CpalDevice::default_output().is_none());
        assert!(CpalDevice::list_outputs().is_empty());
    }
}
