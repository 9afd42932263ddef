//! WorkerProcess - コマンドを 1 件ずつ処理する常駐ワーカー
//!
//! # フロー
//! 1. command queue から `blocking_recv()` で 1 件取得（FIFO）
//! 2. registry (name → TaskRunner) に同期的に適用
//! 3. Start なら TaskRunner がタスク用スレッドを起動
//!
//! The registry is touched only by this loop, so it needs no lock. The only
//! state shared with task threads is each runner's running flag.
//!
//! A command that references an unknown task name is logged and dropped; the
//! loop keeps serving every other task.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::runner::TaskRunner;
use crate::domain::{Command, RunId, ShuttleError, TaskName};
use crate::queue::{CommandReceiver, ResultSender};
use crate::typed::{BoundArgs, CyclicTask};

pub struct WorkerProcess {
    runners: HashMap<TaskName, TaskRunner>,
    results: ResultSender,
}

impl WorkerProcess {
    pub fn new(results: ResultSender) -> Self {
        Self {
            runners: HashMap::new(),
            results,
        }
    }

    /// Run the dispatch loop on a dedicated thread.
    pub fn spawn(commands: CommandReceiver, results: ResultSender) -> std::io::Result<WorkerHandle> {
        let worker = Self::new(results);
        let handle = thread::Builder::new()
            .name("shuttle-worker".to_string())
            .spawn(move || worker.run_ever(commands))?;
        Ok(WorkerHandle { handle })
    }

    /// Serve commands until every sender is gone.
    pub fn run_ever(mut self, mut commands: CommandReceiver) {
        info!(target: "shuttle.worker", "dispatch loop started");
        while let Some(command) = commands.blocking_recv() {
            self.handle(command);
        }
        // detached task threads stop at their next cycle boundary
        self.stop_all();
        info!(target: "shuttle.worker", runners = self.runners.len(), "dispatch loop finished");
    }

    /// Apply one command; failures are logged, never fatal to the loop.
    pub fn handle(&mut self, command: Command) {
        let tag = command.tag();
        if let Err(err) = self.apply(command) {
            warn!(target: "shuttle.worker", command = tag, error = %err, "command dropped");
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<(), ShuttleError> {
        match command {
            Command::Add { name, task } => self.add(name, task),
            Command::Modify { name, task } => self.modify(name, task),
            Command::Start { name, args, run } => self.start(name, args, run),
            Command::Stop { name } => self.stop(&name),
            Command::StopAll => {
                self.stop_all();
                Ok(())
            }
        }
    }

    /// `Some(running)` for a registered name, `None` otherwise.
    pub fn is_running(&self, name: &str) -> Option<bool> {
        self.runners.get(name).map(TaskRunner::is_running)
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    fn add(&mut self, name: TaskName, task: CyclicTask) -> Result<(), ShuttleError> {
        if self.runners.contains_key(name.as_str()) {
            warn!(target: "shuttle.worker", task = %name, "add for an existing task; treating as modify");
            return self.modify(name, task);
        }
        let runner = TaskRunner::new(name.clone(), task, self.results.clone());
        self.runners.insert(name.clone(), runner);
        debug!(target: "shuttle.worker", task = %name, "registered");
        Ok(())
    }

    fn modify(&mut self, name: TaskName, task: CyclicTask) -> Result<(), ShuttleError> {
        self.runner_mut(&name)?.replace_task(task)?;
        debug!(target: "shuttle.worker", task = %name, "modified");
        Ok(())
    }

    fn start(&mut self, name: TaskName, args: BoundArgs, run: RunId) -> Result<(), ShuttleError> {
        let runner = self.runner_mut(&name)?;
        let started = runner
            .start(args, run)
            .map_err(|e| ShuttleError::operation(format!("failed to spawn task thread: {e}")))?;
        if started {
            debug!(target: "shuttle.worker", task = %name, run = %run, "started");
        } else {
            warn!(target: "shuttle.worker", task = %name, run = %run, "already running; start ignored");
        }
        Ok(())
    }

    fn stop(&mut self, name: &TaskName) -> Result<(), ShuttleError> {
        self.runner_mut(name)?.quit();
        debug!(target: "shuttle.worker", task = %name, "stopped");
        Ok(())
    }

    fn stop_all(&mut self) {
        for runner in self.runners.values() {
            runner.quit();
        }
    }

    fn runner_mut(&mut self, name: &TaskName) -> Result<&mut TaskRunner, ShuttleError> {
        self.runners
            .get_mut(name.as_str())
            .ok_or_else(|| ShuttleError::process(format!("task '{name}' is not registered")))
    }
}

/// Handle to the dispatch loop thread.
pub struct WorkerHandle {
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the loop to end. On timeout the thread is
    /// left detached and `false` is returned.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.handle.join().is_ok()
    }
}
