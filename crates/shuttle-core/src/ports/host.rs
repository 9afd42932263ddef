//! Host ports - ホスト（GUI / イベントループ）側の境界
//!
//! The engine never touches host state directly. It needs three things from
//! the host toolkit:
//! - **HostSink**: move a result from the watcher context onto the host's own
//!   thread (thread-safe, non-blocking)
//! - **EventPump**: let the host process pending events between dispatches
//! - **CloseHook**: intercept the host's close/shutdown handler

use crate::domain::TaskResult;

/// Receives results on the watcher side and hands them to the host thread.
pub trait HostSink: Send + Sync {
    fn post(&self, result: TaskResult);
}

/// Flushes pending host events after each listener dispatch, so a burst of
/// results does not starve the host's own event processing.
pub trait EventPump: Send + Sync {
    fn process_events(&self);
}

/// Host without an event loop of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPump;

impl EventPump for NoopPump {
    fn process_events(&self) {}
}

pub type CloseHandler = Box<dyn FnOnce() + Send + 'static>;

/// A host object whose close handler can be wrapped.
pub trait CloseHook {
    /// Remove and return the current close handler, if any.
    fn take_close_handler(&mut self) -> Option<CloseHandler>;

    fn set_close_handler(&mut self, handler: CloseHandler);
}
