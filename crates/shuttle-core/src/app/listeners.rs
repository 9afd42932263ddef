//! Listeners - タスク名ごとのコールバック管理と結果の配送
//!
//! - **CallController**: 1 つのタスク名に対するコールバック列（登録順に呼ぶ）
//! - **ListenerRegistry**: name → { always, once } の対応表
//! - **Renderer**: ホスト向けの窓口（`on` / `once` / `remove` / `cancel` / `clear`）
//!
//! Callbacks run on whatever thread calls `dispatch` (the host thread, when
//! results arrive through `HostQueue`). They are invoked outside the registry
//! lock, so a callback may add or remove listeners.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::trace;

use crate::domain::{ListenerId, TaskName, TaskResult};
use crate::ports::{EventPump, NoopPump};

pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    callback: Callback,
}

/// Ordered callbacks for one task name.
#[derive(Clone, Default)]
pub struct CallController {
    listeners: Vec<Listener>,
}

impl CallController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: ListenerId, callback: Callback) {
        self.listeners.push(Listener { id, callback });
    }

    /// Remove one occurrence. Returns whether it was present.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        match self.listeners.iter().position(|l| l.id == id) {
            Some(idx) => {
                self.listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Invoke every callback in registration order, then let the host flush
    /// its pending events.
    pub fn call(&self, payload: &[Value], pump: &dyn EventPump) {
        for listener in &self.listeners {
            (listener.callback)(payload);
        }
        pump.process_events();
    }
}

impl fmt::Debug for CallController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.listeners.iter().map(|l| l.id))
            .finish()
    }
}

#[derive(Default)]
struct ListenerEntry {
    always: CallController,
    once: CallController,
}

impl ListenerEntry {
    fn is_empty(&self) -> bool {
        self.always.is_empty() && self.once.is_empty()
    }

    fn len(&self) -> usize {
        self.always.len() + self.once.len()
    }
}

/// task name → callbacks.
pub struct ListenerRegistry {
    entries: Mutex<HashMap<TaskName, ListenerEntry>>,
    next_id: AtomicU64,
    pump: Arc<dyn EventPump>,
}

impl ListenerRegistry {
    pub fn new(pump: Arc<dyn EventPump>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            pump,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskName, ListenerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Call `callback` for every result of `name`.
    pub fn on(&self, name: impl Into<TaskName>, callback: Callback) -> ListenerId {
        let id = self.allocate_id();
        self.lock().entry(name.into()).or_default().always.add(id, callback);
        id
    }

    /// Call `callback` for the next result of `name` only.
    pub fn once(&self, name: impl Into<TaskName>, callback: Callback) -> ListenerId {
        let id = self.allocate_id();
        self.lock().entry(name.into()).or_default().once.add(id, callback);
        id
    }

    /// Remove one listener. An entry left without callbacks is dropped.
    pub fn remove(&self, name: &str, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(name) else {
            return false;
        };
        let removed = entry.always.remove(id) || entry.once.remove(id);
        if entry.is_empty() {
            entries.remove(name);
        }
        removed
    }

    /// Drop every listener of `name`.
    pub fn cancel(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.lock().get(name).map_or(0, ListenerEntry::len)
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Number of task names with at least one listener.
    pub fn listening_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver one result. Returns `false` when nobody listens for its name,
    /// which is normal after a cancel.
    pub fn dispatch(&self, result: &TaskResult) -> bool {
        let name = result.name().as_str();
        let (always, once) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(name) else {
                trace!(target: "shuttle.listeners", task = name, "no listeners; result dropped");
                return false;
            };
            let always = entry.always.clone();
            let once = std::mem::take(&mut entry.once);
            if entry.is_empty() {
                entries.remove(name);
            }
            (always, once)
        };

        if !always.is_empty() {
            always.call(result.payload(), self.pump.as_ref());
        }
        if !once.is_empty() {
            once.call(result.payload(), self.pump.as_ref());
        }
        true
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NoopPump))
    }
}

/// Host-facing listener API.
#[derive(Clone)]
pub struct Renderer {
    registry: Arc<ListenerRegistry>,
}

impl Renderer {
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    pub fn on<F>(&self, name: impl Into<TaskName>, callback: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.registry.on(name, Arc::new(callback))
    }

    pub fn once<F>(&self, name: impl Into<TaskName>, callback: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.registry.once(name, Arc::new(callback))
    }

    pub fn remove(&self, name: &str, id: ListenerId) -> bool {
        self.registry.remove(name, id)
    }

    pub fn cancel(&self, name: &str) -> bool {
        self.registry.cancel(name)
    }

    pub fn clear(&self) {
        self.registry.clear()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.registry.listener_count(name)
    }

    pub fn dispatch(&self, result: &TaskResult) -> bool {
        self.registry.dispatch(result)
    }
}
