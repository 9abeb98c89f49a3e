//! Event listener contract and helpers.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::dispatcher::DispatchError;
use super::model::{Event, EventType};

/// Highest possible listener priority.
pub const HIGHEST_PRIORITY: i32 = i32::MIN;

/// Priority used when a listener does not override [`EventListener::priority`].
pub const DEFAULT_PRIORITY: i32 = i32::MAX;

/// Handler for events of one declared type (and its subtypes).
///
/// Listeners compare by identity: two `Arc`s pointing at the same listener
/// are the same registration regardless of priority.
///
/// Used as `Arc<dyn EventListener>`.
pub trait EventListener: Send + Sync {
    /// The event type this listener accepts.
    ///
    /// `None` means the listener is not bound to a concrete type; such
    /// listeners are rejected at registration.
    fn declared_event_type(&self) -> Option<&'static EventType>;

    /// Handles one event. Expected not to panic; a panic is logged and
    /// contained to this listener.
    fn on_event(&self, event: &dyn Event);

    /// Smaller values run first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }
}

/// Shared handle to a registered listener.
pub type ListenerRef = Arc<dyn EventListener>;

/// Identity comparison for listener handles.
#[must_use]
pub fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Invokes `listener` with `event`, containing and logging any panic.
///
/// Returns `false` if the listener panicked.
pub fn invoke_listener(listener: &dyn EventListener, event: &dyn Event) -> bool {
    match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                event_type = %event.event_type(),
                source = event.source(),
                priority = listener.priority(),
                panic = panic_message(payload.as_ref()),
                "event listener panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Closure-backed listener.
pub struct FnListener<F> {
    event_type: &'static EventType,
    priority: i32,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&dyn Event) + Send + Sync,
{
    /// Creates a listener for `event_type` with [`DEFAULT_PRIORITY`].
    pub fn new(event_type: &'static EventType, handler: F) -> Self {
        Self {
            event_type,
            priority: DEFAULT_PRIORITY,
            handler,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&dyn Event) + Send + Sync,
{
    fn declared_event_type(&self) -> Option<&'static EventType> {
        Some(self.event_type)
    }

    fn on_event(&self, event: &dyn Event) {
        (self.handler)(event);
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener")
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Something listeners can be attached to.
pub trait Listenable {
    /// Registers a listener. Re-adding an already registered listener is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UndeclaredEventType`] if the listener does
    /// not declare an event type.
    fn add_listener(&self, listener: ListenerRef) -> Result<(), DispatchError>;

    /// Removes a listener; absent listeners are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UndeclaredEventType`] if the listener does
    /// not declare an event type.
    fn remove_listener(&self, listener: &ListenerRef) -> Result<(), DispatchError>;

    /// Every registered listener, deduplicated and ordered by priority.
    fn get_all_listeners(&self) -> Vec<ListenerRef>;

    /// Registers each listener in turn, stopping at the first invalid one.
    ///
    /// # Errors
    ///
    /// See [`Listenable::add_listener`].
    fn add_listeners<I>(&self, listeners: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = ListenerRef>,
        Self: Sized,
    {
        listeners
            .into_iter()
            .try_for_each(|listener| self.add_listener(listener))
    }

    /// Removes each listener in turn, stopping at the first invalid one.
    ///
    /// # Errors
    ///
    /// See [`Listenable::remove_listener`].
    fn remove_listeners<I>(&self, listeners: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = ListenerRef>,
        Self: Sized,
    {
        listeners
            .into_iter()
            .try_for_each(|listener| self.remove_listener(&listener))
    }

    /// Removes every registered listener.
    ///
    /// # Errors
    ///
    /// See [`Listenable::remove_listener`].
    fn remove_all_listeners(&self) -> Result<(), DispatchError>
    where
        Self: Sized,
    {
        self.remove_listeners(self.get_all_listeners())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::model::{GenericEvent, ROOT_EVENT};

    #[test]
    fn same_listener_compares_identity() {
        let a: ListenerRef = Arc::new(FnListener::new(&ROOT_EVENT, |_: &dyn Event| {}));
        let b: ListenerRef = Arc::new(FnListener::new(&ROOT_EVENT, |_: &dyn Event| {}));
        let a2 = Arc::clone(&a);

        assert!(same_listener(&a, &a2));
        assert!(!same_listener(&a, &b));
    }

    #[test]
    fn fn_listener_defaults_to_lowest_priority() {
        let listener = FnListener::new(&ROOT_EVENT, |_: &dyn Event| {});
        assert_eq!(listener.priority(), DEFAULT_PRIORITY);
        assert_eq!(listener.with_priority(-5).priority(), -5);
    }

    #[test]
    fn invoke_listener_contains_panics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ok = FnListener::new(&ROOT_EVENT, move |_: &dyn Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let boom = FnListener::new(&ROOT_EVENT, |_: &dyn Event| panic!("listener failure"));
        let event = GenericEvent::new("test", "payload");

        assert!(invoke_listener(&ok, &event));
        assert!(!invoke_listener(&boom, &event));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_message_reads_string_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }
}
