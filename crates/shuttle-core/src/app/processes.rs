//! ProcessTracker - タスク本体が起動した子プロセスの記録
//!
//! Task bodies that start external programs do it through the engine's
//! tracker (`Controller::processes()`). With `reap_task_processes` on,
//! shutdown kills whatever is still recorded, together with its own
//! descendants. Processes the host started by other means are never touched.

use std::collections::BTreeSet;
use std::io;
use std::ops::{Deref, DerefMut};
use std::process::{Child, Command};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Shared set of live child pids. Cheap to clone; every clone records into
/// the same set.
#[derive(Debug, Clone, Default)]
pub struct ProcessTracker {
    pids: Arc<Mutex<BTreeSet<u32>>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a pid started outside `spawn`.
    pub fn track(&self, pid: u32) {
        if self.lock().insert(pid) {
            debug!(target: "shuttle.processes", pid, "tracking");
        }
    }

    pub fn untrack(&self, pid: u32) -> bool {
        self.lock().remove(&pid)
    }

    /// Spawn `command` and record its pid until it is known to have exited.
    pub fn spawn(&self, command: &mut Command) -> io::Result<TrackedChild> {
        let child = command.spawn()?;
        self.track(child.id());
        Ok(TrackedChild {
            child,
            tracker: self.clone(),
        })
    }

    pub fn tracked(&self) -> Vec<u32> {
        self.lock().iter().copied().collect()
    }

    /// Empty the set, returning what was in it.
    pub(crate) fn take_all(&self) -> Vec<u32> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }
}

/// A child spawned through a `ProcessTracker`.
///
/// Dropping it forgets the pid only if the child has exited; a child still
/// running stays recorded so shutdown can reap it.
#[derive(Debug)]
pub struct TrackedChild {
    child: Child,
    tracker: ProcessTracker,
}

impl Deref for TrackedChild {
    type Target = Child;

    fn deref(&self) -> &Child {
        &self.child
    }
}

impl DerefMut for TrackedChild {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            self.tracker.untrack(self.child.id());
        }
    }
}
