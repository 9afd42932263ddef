//! TaskRunner - 1 つのタスク名に対する実行状態
//!
//! # フロー
//! 1. `start()` でスレッドを 1 本起動（実行中なら何もしない）
//! 2. スレッドは CyclicTask から Callable を 1 つずつ取り出して実行
//! 3. 結果を `(name, *payload)` として result queue に push
//! 4. サイクルの境目で running フラグを確認（協調的キャンセル）
//!
//! Cancellation never interrupts a callable that is already executing. It
//! only prevents the next cycle from starting; a result produced after the
//! stop request is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::domain::{RunEnd, RunEvent, RunId, ShuttleError, TaskName, TaskResult};
use crate::queue::ResultSender;
use crate::typed::{BoundArgs, CyclicTask};

/// One thread running (or finishing) cycles of this runner's task.
struct Execution {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns one named task and at most one execution thread for it.
///
/// Design:
/// - The `CyclicTask` sits behind a mutex shared with the execution thread;
///   the lock is only held while pulling the next callable, never while a
///   callable runs.
/// - Each start gets its own running flag. `quit()` clears the current one,
///   so a later start can never be confused with an earlier execution that is
///   still finishing its last cycle.
pub struct TaskRunner {
    name: TaskName,
    task: Arc<Mutex<CyclicTask>>,
    results: ResultSender,
    current: Option<Execution>,
}

impl TaskRunner {
    pub fn new(name: TaskName, task: impl Into<CyclicTask>, results: ResultSender) -> Self {
        Self {
            name,
            task: Arc::new(Mutex::new(task.into())),
            results,
            current: None,
        }
    }

    pub fn name(&self) -> &TaskName {
        &self.name
    }

    /// True from `start()` until the sequence is exhausted or `quit()` is called.
    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|e| e.running.load(Ordering::Acquire))
    }

    pub fn cycles_completed(&self) -> u32 {
        lock(&self.task).cycles_completed()
    }

    /// Swap the task. Rejected while running.
    pub fn replace_task(&mut self, task: impl Into<CyclicTask>) -> Result<(), ShuttleError> {
        if self.is_running() {
            return Err(ShuttleError::operation(format!(
                "task '{}' is still running; modification ignored",
                self.name
            )));
        }
        *lock(&self.task) = task.into();
        Ok(())
    }

    /// Start a new execution thread. Returns `Ok(false)` when already running.
    ///
    /// The sequence is reloaded before the first cycle. If the previous
    /// execution is still finishing an in-flight cycle, the new thread waits
    /// for it first, so two cycles of one task never overlap.
    pub fn start(&mut self, args: BoundArgs, run: RunId) -> std::io::Result<bool> {
        if self.is_running() {
            return Ok(false);
        }

        let previous = self.current.take().map(|e| e.handle);
        let running = Arc::new(AtomicBool::new(true));
        let ctx = RunContext {
            name: self.name.clone(),
            task: Arc::clone(&self.task),
            results: self.results.clone(),
            running: Arc::clone(&running),
            args,
            run,
            previous,
        };

        let handle = thread::Builder::new()
            .name(format!("shuttle-task-{}", self.name.as_str().replace('\0', "")))
            .spawn(move || ctx.run())?;

        self.current = Some(Execution { running, handle });
        Ok(true)
    }

    /// Request a stop at the next cycle boundary. Idempotent, never blocks.
    pub fn quit(&self) {
        if let Some(e) = &self.current {
            e.running.store(false, Ordering::Release);
        }
    }
}

fn lock(task: &Mutex<CyclicTask>) -> MutexGuard<'_, CyclicTask> {
    task.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the execution thread owns.
struct RunContext {
    name: TaskName,
    task: Arc<Mutex<CyclicTask>>,
    results: ResultSender,
    running: Arc<AtomicBool>,
    args: BoundArgs,
    run: RunId,
    previous: Option<JoinHandle<()>>,
}

/// Clears the running flag and reports the end of the run however the thread
/// ends, including a panicking callable.
struct RunEnder {
    name: TaskName,
    run: RunId,
    running: Arc<AtomicBool>,
    results: ResultSender,
    reason: RunEnd,
}

impl Drop for RunEnder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if self.reason == RunEnd::Panicked {
            warn!(target: "shuttle.runner", task = %self.name, run = %self.run, "callable panicked");
        }
        // the watcher may already be gone
        let _ = self.results.send(RunEvent::Ended {
            name: self.name.clone(),
            run: self.run,
            reason: self.reason,
        });
    }
}

impl RunContext {
    fn run(self) {
        let RunContext {
            name,
            task,
            results,
            running,
            args,
            run,
            previous,
        } = self;

        if let Some(previous) = previous
            && previous.join().is_err()
        {
            warn!(target: "shuttle.runner", task = %name, "previous execution panicked");
        }

        let mut ender = RunEnder {
            name: name.clone(),
            run,
            running: Arc::clone(&running),
            results: results.clone(),
            reason: RunEnd::Panicked,
        };
        ender.reason = cycle(&name, &task, &results, &running, &args, run);
    }
}

fn cycle(
    name: &TaskName,
    task: &Mutex<CyclicTask>,
    results: &ResultSender,
    running: &AtomicBool,
    args: &BoundArgs,
    run: RunId,
) -> RunEnd {
    lock(task).reload();
    debug!(target: "shuttle.runner", task = %name, run = %run, "execution started");

    let mut cycles = 0u32;
    loop {
        let (callable, last) = {
            let mut task = lock(task);
            if !running.load(Ordering::Acquire) {
                debug!(target: "shuttle.runner", task = %name, run = %run, cycles, "cancelled");
                return RunEnd::Cancelled;
            }
            match task.next() {
                Some(callable) => (callable, task.remaining() == Some(0)),
                None => return RunEnd::Exhausted,
            }
        };

        let value = callable.call(args);

        if !running.load(Ordering::Acquire) {
            debug!(target: "shuttle.runner", task = %name, run = %run, "stopped mid-cycle; result discarded");
            return RunEnd::Cancelled;
        }
        // 最後の結果が観測された時点で runner は start を受け付けられる
        if last {
            running.store(false, Ordering::Release);
        }
        cycles += 1;
        let result = TaskResult::from_return(name.clone(), value).with_run(run);
        if results.send(RunEvent::Cycle(result)).is_err() {
            debug!(target: "shuttle.runner", task = %name, run = %run, "result queue closed");
            return RunEnd::Disconnected;
        }
        if last {
            debug!(target: "shuttle.runner", task = %name, run = %run, cycles, "execution finished");
            return RunEnd::Exhausted;
        }
    }
}
