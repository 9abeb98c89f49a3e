//! Typed event dispatch.
//!
//! - [`Event`] / [`EventType`]: immutable occurrences tagged with an explicit,
//!   author-declared single-inheritance type chain
//! - [`EventListener`]: handlers that self-report the event type they accept
//!   and a priority (smaller runs first)
//! - [`EventDispatcher`]: routes events to every listener registered for the
//!   event's type or one of its ancestors, in priority order
//! - [`Executor`]: where a dispatch runs ([`DirectExecutor`] or
//!   [`TokioExecutor`])

pub mod dispatcher;
pub mod executor;
pub mod listener;
pub mod model;

pub use dispatcher::{DispatchError, EventDispatcher};
pub use executor::{DirectExecutor, Executor, Task, TokioExecutor};
pub use listener::{
    invoke_listener, same_listener, EventListener, FnListener, Listenable, ListenerRef,
    DEFAULT_PRIORITY, HIGHEST_PRIORITY,
};
pub use model::{Event, EventMetadata, EventType, GenericEvent, ROOT_EVENT};
