//! Listener capability and the multiplexer routing event kinds to listeners.

use crate::error::CoreResult;
use crate::event::{EventKind, Values};

/// Accepts one kind of timing value from the load generator.
///
/// Listeners are driven from a single event-dispatch context, hence the
/// `&mut self` receivers.
pub trait ValueListener: Send {
    /// Handles one completed exchange of the given kind.
    ///
    /// An error means the caller broke the listener's contract (malformed
    /// values, listener already stopped). Downstream I/O problems are not
    /// reported here.
    fn on_value(&mut self, kind: EventKind, values: &Values) -> CoreResult<()>;

    /// Handles the terminal "load generation stopped" notification.
    fn on_stop(&mut self) -> CoreResult<()>;
}

impl<L: ValueListener + ?Sized> ValueListener for Box<L> {
    fn on_value(&mut self, kind: EventKind, values: &Values) -> CoreResult<()> {
        (**self).on_value(kind, values)
    }

    fn on_stop(&mut self) -> CoreResult<()> {
        (**self).on_stop()
    }
}

struct Subscription {
    response_time: bool,
    latency_time: bool,
    listener: Box<dyn ValueListener>,
}

impl Subscription {
    fn wants(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::ResponseTime => self.response_time,
            EventKind::LatencyTime => self.latency_time,
        }
    }
}

/// Fans the generator's response-time and latency-time callbacks out to the
/// listeners subscribed to each kind.
///
/// A listener registered for both kinds sees both streams through its single
/// [`ValueListener::on_value`] entry point, each value tagged with its kind.
#[derive(Default)]
pub struct ListenerMux {
    subscriptions: Vec<Subscription>,
}

impl ListenerMux {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to the given kinds.
    pub fn register(&mut self, kinds: &[EventKind], listener: impl ValueListener + 'static) {
        self.subscriptions.push(Subscription {
            response_time: kinds.contains(&EventKind::ResponseTime),
            latency_time: kinds.contains(&EventKind::LatencyTime),
            listener: Box::new(listener),
        });
    }

    /// Builder-style variant of [`ListenerMux::register`].
    #[must_use]
    pub fn with(mut self, kinds: &[EventKind], listener: impl ValueListener + 'static) -> Self {
        self.register(kinds, listener);
        self
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn on_response_time_value(&mut self, values: &Values) -> CoreResult<()> {
        self.dispatch(EventKind::ResponseTime, values)
    }

    pub fn on_latency_time_value(&mut self, values: &Values) -> CoreResult<()> {
        self.dispatch(EventKind::LatencyTime, values)
    }

    /// Delivers `values` to every subscriber of `kind`.
    ///
    /// All subscribers are called even if one fails; the first error is
    /// returned.
    pub fn dispatch(&mut self, kind: EventKind, values: &Values) -> CoreResult<()> {
        let mut first_err = None;
        for sub in self.subscriptions.iter_mut().filter(|s| s.wants(kind)) {
            if let Err(e) = sub.listener.on_value(kind, values) {
                tracing::debug!(kind = %kind, error = %e, "listener rejected value");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Forwards the stop notification to every listener exactly once.
    pub fn on_stop(&mut self) -> CoreResult<()> {
        let mut first_err = None;
        for sub in &mut self.subscriptions {
            if let Err(e) = sub.listener.on_stop() {
                tracing::warn!(error = %e, "listener failed to stop");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl ValueListener for ListenerMux {
    fn on_value(&mut self, kind: EventKind, values: &Values) -> CoreResult<()> {
        self.dispatch(kind, values)
    }

    fn on_stop(&mut self) -> CoreResult<()> {
        ListenerMux::on_stop(self)
    }
}
