//! Change detection for node configuration.

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::zeitgeber::Handle;

/// Rebuilds and publishes a node's configuration only when its settings change.
///
/// The controller remembers the settings it last published. Applying equal
/// settings again is a no-op, different settings are built into a complete
/// configuration message off the audio thread and sent through the node's
/// [`Handle`]. When the build fails or the queue is full nothing is sent and
/// the node keeps running on its previous configuration.
///
/// ```
/// use zeitgeber::{Controller, Zeitgeber};
/// use zeitgeber::nodes::{DllMessage, DllNode, DllSettings};
///
/// let mut zg = Zeitgeber::new(48_000);
/// let ctx = zg.context();
/// let store = zg.store().clone();
///
/// let settings = DllSettings::default();
/// let dll = zg.add(DllNode::new(settings.build(&ctx, &store).unwrap()));
/// let mut control = Controller::with_settings(dll, settings.clone());
///
/// let build = |s: &DllSettings| s.build(&ctx, &store).map(DllMessage::configure);
///
/// // Same settings: nothing to do
/// assert_eq!(control.apply(&settings, build), Ok(false));
///
/// let narrow = DllSettings { bandwidth: 0.05, ..settings };
/// assert_eq!(control.apply(&narrow, build), Ok(true));
/// ```
pub struct Controller<S, M: Send + 'static> {
    handle: Handle<M>,
    current: Option<S>,
}

impl<S, M> Controller<S, M>
where
    S: Clone + PartialEq,
    M: Send + 'static,
{
    /// A controller that has not published anything yet.
    pub fn new(handle: Handle<M>) -> Self {
        Self {
            handle,
            current: None,
        }
    }

    /// A controller for a node that was constructed from `settings`.
    pub fn with_settings(handle: Handle<M>, settings: S) -> Self {
        Self {
            handle,
            current: Some(settings),
        }
    }

    /// Settings of the configuration most recently published.
    pub fn settings(&self) -> Option<&S> {
        self.current.as_ref()
    }

    pub fn handle(&self) -> &Handle<M> {
        &self.handle
    }

    /// Publish a configuration built from `settings` if they differ from the
    /// current ones.
    ///
    /// Returns `Ok(true)` when a new configuration was sent, `Ok(false)` when
    /// the settings were unchanged.
    pub fn apply<F>(&mut self, settings: &S, build: F) -> Result<bool, ConfigError>
    where
        F: FnOnce(&S) -> Result<M, ConfigError>,
    {
        if self.current.as_ref() == Some(settings) {
            return Ok(false);
        }

        let msg = build(settings).map_err(|err| {
            warn!(%err, "configuration rejected, keeping the active one");
            err
        })?;

        if self.handle.send(msg).is_err() {
            warn!("message queue full, keeping the active configuration");
            return Err(ConfigError::QueueFull);
        }

        debug!(node = ?self.handle.id(), "published new configuration");
        self.current = Some(settings.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use core::marker::PhantomData;

    use super::*;
    use crate::node::NodeId;

    fn handle(capacity: usize) -> (Handle<u32>, rtrb::Consumer<u32>) {
        let (sender, receiver) = rtrb::RingBuffer::new(capacity);
        let handle = Handle {
            node_id: NodeId(0),
            sender,
            _marker: PhantomData,
        };
        (handle, receiver)
    }

    #[test]
    fn publishes_only_on_change() {
        let (handle, mut rx) = handle(4);
        let mut control = Controller::new(handle);

        assert_eq!(control.apply(&1.5_f64, |s| Ok(*s as u32)), Ok(true));
        assert_eq!(control.apply(&1.5_f64, |_| panic!("must not rebuild")), Ok(false));
        assert_eq!(control.apply(&2.5_f64, |s| Ok(*s as u32)), Ok(true));

        assert_eq!(rx.pop(), Ok(1));
        assert_eq!(rx.pop(), Ok(2));
        assert!(rx.pop().is_err());
        assert_eq!(control.settings(), Some(&2.5));
    }

    #[test]
    fn failed_build_keeps_previous_settings() {
        let (handle, mut rx) = handle(4);
        let mut control = Controller::with_settings(handle, "CLOCK_REALTIME".to_string());

        let err = control.apply(&"CLOCK_BOGUS".to_string(), |s| {
            Err(ConfigError::UnknownClock(s.clone()))
        });
        assert_eq!(err, Err(ConfigError::UnknownClock("CLOCK_BOGUS".into())));
        assert_eq!(control.settings().map(String::as_str), Some("CLOCK_REALTIME"));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn full_queue_is_reported() {
        let (handle, _rx) = handle(1);
        let mut control = Controller::new(handle);

        assert_eq!(control.apply(&1_u32, |s| Ok(*s)), Ok(true));
        assert_eq!(control.apply(&2_u32, |s| Ok(*s)), Err(ConfigError::QueueFull));
        assert_eq!(control.settings(), Some(&1));
    }
}
