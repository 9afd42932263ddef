//! RegistrationMirror - ワーカーの registry をホスト側で写したもの
//!
//! Shared by the Controller (register/start/cancel) and the ResultWatcher
//! (one observed result of the current run = one completed cycle; an end
//! notice of the current run clears `active`). Used for validation and
//! logging only.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::status::RegistrationSnapshot;
use crate::domain::{RunId, TaskName};
use crate::typed::{CyclicTask, Signature};

#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) signature: Signature,
    pub(crate) cycle_limit: u32,
    pub(crate) cycles_already: u32,
    pub(crate) active: bool,
    pub(crate) registered_at: DateTime<Utc>,
    /// Latest start; events of any other run are ignored.
    pub(crate) run: Option<RunId>,
}

impl Registration {
    pub(crate) fn new(task: &CyclicTask, registered_at: DateTime<Utc>) -> Self {
        Self {
            signature: task.signature().clone(),
            cycle_limit: task.cycle_limit(),
            cycles_already: 0,
            active: false,
            registered_at,
            run: None,
        }
    }

    /// Started, not cancelled, not ended, and with cycles to go.
    pub(crate) fn is_running(&self) -> bool {
        self.active && (self.cycle_limit == 0 || self.cycles_already < self.cycle_limit)
    }

    /// A running task must not be clobbered.
    pub(crate) fn blocks_reregistration(&self) -> bool {
        self.is_running()
    }

    pub(crate) fn begin(&mut self, run: RunId) {
        self.active = true;
        self.cycles_already = 0;
        self.run = Some(run);
    }

    fn is_current(&self, run: Option<RunId>) -> bool {
        run.is_some() && self.run == run
    }

    fn snapshot(&self, name: &TaskName) -> RegistrationSnapshot {
        RegistrationSnapshot {
            name: name.clone(),
            cycle_limit: self.cycle_limit,
            cycles_already: self.cycles_already,
            active: self.active,
            registered_at: self.registered_at,
            signature: self.signature.clone(),
            run: self.run,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registrations {
    entries: HashMap<TaskName, Registration>,
}

impl Registrations {
    pub(crate) fn get(&self, name: &str) -> Option<&Registration> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Registration> {
        self.entries.get_mut(name)
    }

    /// Returns `true` when the name was already known.
    pub(crate) fn insert(&mut self, name: TaskName, registration: Registration) -> bool {
        self.entries.insert(name, registration).is_some()
    }

    pub(crate) fn snapshot(&self, name: &str) -> Option<RegistrationSnapshot> {
        self.entries
            .get_key_value(name)
            .map(|(name, reg)| reg.snapshot(name))
    }

    pub(crate) fn snapshots(&self) -> Vec<RegistrationSnapshot> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(name, reg)| reg.snapshot(name))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.entries.values().filter(|r| r.active).count()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RegistrationMirror {
    inner: Mutex<Registrations>,
}

impl RegistrationMirror {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one delivered result of the current run; a bounded run that
    /// reached its limit is no longer active. Returns whether it was counted.
    pub(crate) fn observe_cycle(&self, name: &TaskName, run: Option<RunId>) -> bool {
        let mut book = self.lock();
        let Some(reg) = book.get_mut(name.as_str()) else {
            return false;
        };
        if !reg.is_current(run) {
            return false;
        }
        reg.cycles_already = reg.cycles_already.saturating_add(1);
        if reg.cycle_limit > 0 && reg.cycles_already >= reg.cycle_limit {
            reg.active = false;
        }
        true
    }

    /// The execution thread of `run` is gone (exhausted, cancelled, panicked).
    pub(crate) fn observe_end(&self, name: &TaskName, run: RunId) -> bool {
        let mut book = self.lock();
        match book.get_mut(name.as_str()) {
            Some(reg) if reg.is_current(Some(run)) => {
                reg.active = false;
                true
            }
            _ => false,
        }
    }
}
