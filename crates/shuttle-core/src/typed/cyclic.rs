//! CyclicTask - 同じ Callable を決められた回数（または無限に）繰り返す
//!
//! The task body is fixed for the lifetime of a `CyclicTask`. To run
//! something else under the same name, register a new task: the runner swaps
//! the whole `CyclicTask`.

use super::callable::Callable;
use super::signature::Signature;

/// Lazy, restartable sequence of invocations of one callable.
///
/// - `cycle_limit == 0`: unbounded
/// - otherwise: exactly `cycle_limit` items, then `None`
///
/// Invariant: `cycles_completed <= cycle_limit` whenever `cycle_limit > 0`.
#[derive(Debug, Clone)]
pub struct CyclicTask {
    proto: Callable,
    cycle_limit: u32,
    cycles_completed: u32,
}

impl CyclicTask {
    pub fn new(proto: Callable, cycle_limit: u32) -> Self {
        Self {
            proto,
            cycle_limit,
            cycles_completed: 0,
        }
    }

    /// Repeat until cancelled.
    pub fn unbounded(proto: Callable) -> Self {
        Self::new(proto, 0)
    }

    /// Run exactly once per start.
    pub fn once(proto: Callable) -> Self {
        Self::new(proto, 1)
    }

    pub fn task_proto(&self) -> &Callable {
        &self.proto
    }

    pub fn signature(&self) -> &Signature {
        self.proto.signature()
    }

    pub fn cycle_limit(&self) -> u32 {
        self.cycle_limit
    }

    pub fn cycles_completed(&self) -> u32 {
        self.cycles_completed
    }

    pub fn is_unbounded(&self) -> bool {
        self.cycle_limit == 0
    }

    /// Cycles left before exhaustion; `None` when unbounded.
    pub fn remaining(&self) -> Option<u32> {
        if self.is_unbounded() {
            None
        } else {
            Some(self.cycle_limit - self.cycles_completed)
        }
    }

    /// Restart the sequence without touching the body or the limit.
    pub fn reload(&mut self) {
        self.cycles_completed = 0;
    }
}

impl Iterator for CyclicTask {
    type Item = Callable;

    fn next(&mut self) -> Option<Callable> {
        if self.is_unbounded() {
            self.cycles_completed = self.cycles_completed.saturating_add(1);
            return Some(self.proto.clone());
        }
        if self.cycles_completed < self.cycle_limit {
            self.cycles_completed += 1;
            Some(self.proto.clone())
        } else {
            None
        }
    }
}

/// A plain callable runs once per start.
impl From<Callable> for CyclicTask {
    fn from(proto: Callable) -> Self {
        Self::once(proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> Callable {
        Callable::nullary(|| json!("tick"))
    }

    #[test]
    fn bounded_task_yields_limit_items() {
        let mut task = CyclicTask::new(body(), 3);
        assert_eq!(task.remaining(), Some(3));
        assert_eq!(task.by_ref().take(10).count(), 3);
        assert!(task.next().is_none());
        assert_eq!(task.cycles_completed(), 3);
        assert_eq!(task.remaining(), Some(0));
    }

    #[test]
    fn every_item_is_the_same_body() {
        let task = CyclicTask::new(body(), 2);
        let proto = task.task_proto().clone();
        assert!(task.into_iter().all(|c| c.same_body(&proto)));
    }

    #[test]
    fn reload_restarts_the_sequence() {
        let mut task = CyclicTask::new(body(), 2);
        task.by_ref().for_each(drop);
        assert!(task.next().is_none());

        task.reload();
        assert_eq!(task.cycles_completed(), 0);
        assert_eq!(task.cycle_limit(), 2);
        assert_eq!(task.count(), 2);
    }

    #[test]
    fn unbounded_never_ends() {
        let mut task = CyclicTask::unbounded(body());
        assert!(task.is_unbounded());
        assert_eq!(task.remaining(), None);
        assert_eq!(task.by_ref().take(1000).count(), 1000);
        assert!(task.next().is_some());
    }

    #[test]
    fn plain_callable_coerces_to_single_cycle() {
        let task: CyclicTask = body().into();
        assert_eq!(task.cycle_limit(), 1);
        assert_eq!(task.count(), 1);
    }
}
