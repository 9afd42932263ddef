//! Controller - ホスト側の操作窓口（register / start / cancel / shutdown）
//!
//! # 責務
//! - 引数やタスク名の検証（失敗したらコマンドは送らない）
//! - command queue へのコマンド送信
//! - RegistrationMirror の更新（読み取りは snapshot 経由のみ）
//! - shutdown の順序制御（watcher → StopAll → channel close → worker join → reaper）
//!
//! Cancellation is cooperative: a stop takes effect at the next cycle
//! boundary. A callable that blocks forever keeps its thread alive; only the
//! process reaper at shutdown can end the child processes it started through
//! `processes()`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::listeners::ListenerRegistry;
use super::mirror::{Registration, RegistrationMirror};
use super::processes::ProcessTracker;
use super::status::{EngineCounts, RegistrationSnapshot};
use super::watcher_loop::ResultWatcher;
use super::worker_loop::WorkerHandle;
use crate::domain::{Command, EngineId, RunId, ShuttleError, TaskName};
use crate::ports::{Clock, CloseHook, IdGenerator, ProcessReaper, ReapScope};
use crate::queue::CommandSender;
use crate::typed::{CallArgs, CyclicTask};

/// What `register` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// New name; an `add` command was sent.
    Added,
    /// Known name; a `modify` command was sent.
    Modified,
    /// The name is still running with cycles to go. Nothing was sent.
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// The dispatch loop ended within `shutdown_timeout`.
    pub worker_joined: bool,

    /// `None` when no reap was attempted.
    pub reaped: Option<bool>,
}

/// Everything a controller drives. Built by `EngineBuilder`.
pub(crate) struct ControllerWiring {
    pub(crate) engine_id: EngineId,
    pub(crate) commands: CommandSender,
    pub(crate) mirror: Arc<RegistrationMirror>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) config: EngineConfig,
    pub(crate) watcher: ResultWatcher,
    pub(crate) worker: WorkerHandle,
    pub(crate) reaper: Option<Arc<dyn ProcessReaper>>,
    pub(crate) processes: ProcessTracker,
}

enum Lifecycle {
    Running {
        watcher: ResultWatcher,
        worker: WorkerHandle,
    },
    Closed(ShutdownReport),
}

struct Inner {
    engine_id: EngineId,
    commands: Mutex<Option<CommandSender>>,
    mirror: Arc<RegistrationMirror>,
    listeners: Arc<ListenerRegistry>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: EngineConfig,
    reaper: Option<Arc<dyn ProcessReaper>>,
    processes: ProcessTracker,
    lifecycle: Mutex<Lifecycle>,
}

/// Host-facing handle. Cheap to clone; every clone drives the same engine.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Controller {
    pub(crate) fn new(wiring: ControllerWiring) -> Self {
        let ControllerWiring {
            engine_id,
            commands,
            mirror,
            listeners,
            clock,
            ids,
            config,
            watcher,
            worker,
            reaper,
            processes,
        } = wiring;
        Self {
            inner: Arc::new(Inner {
                engine_id,
                commands: Mutex::new(Some(commands)),
                mirror,
                listeners,
                clock,
                ids,
                config,
                reaper,
                processes,
                lifecycle: Mutex::new(Lifecycle::Running { watcher, worker }),
            }),
        }
    }

    pub fn engine_id(&self) -> EngineId {
        self.inner.engine_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Where task bodies record the child processes they start.
    pub fn processes(&self) -> ProcessTracker {
        self.inner.processes.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.commands).is_none()
    }

    fn ensure_open(&self) -> Result<(), ShuttleError> {
        if self.is_closed() {
            return Err(ShuttleError::operation("engine is shut down"));
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), ShuttleError> {
        let commands = lock(&self.inner.commands);
        let Some(tx) = commands.as_ref() else {
            return Err(ShuttleError::operation("engine is shut down"));
        };
        let tag = command.tag();
        tx.send(command)
            .map_err(|_| ShuttleError::operation(format!("worker is gone; '{tag}' not delivered")))
    }

    /// Register `task` under `name`, or replace the task already there.
    ///
    /// A name that is running with cycles left (or unbounded) is not touched:
    /// the request is logged and `RegisterOutcome::Rejected` returned.
    pub fn register(
        &self,
        name: impl Into<String>,
        task: impl Into<CyclicTask>,
    ) -> Result<RegisterOutcome, ShuttleError> {
        self.ensure_open()?;
        let name = TaskName::parse(name)?;
        let task = task.into();

        // 送信と mirror 更新を同じロックの中で行う
        let mut book = self.inner.mirror.lock();
        let known = match book.get(name.as_str()) {
            Some(reg) if reg.blocks_reregistration() => {
                warn!(
                    target: "shuttle.controller",
                    task = %name,
                    cycles_already = reg.cycles_already,
                    cycle_limit = reg.cycle_limit,
                    "task is still running; registration ignored"
                );
                return Ok(RegisterOutcome::Rejected);
            }
            Some(_) => true,
            None => false,
        };

        let registration = Registration::new(&task, self.inner.clock.now());
        let command = if known {
            Command::Modify { name: name.clone(), task }
        } else {
            Command::Add { name: name.clone(), task }
        };
        self.send(command)?;
        book.insert(name.clone(), registration);

        let outcome = if known {
            RegisterOutcome::Modified
        } else {
            RegisterOutcome::Added
        };
        debug!(target: "shuttle.controller", task = %name, ?outcome, "registered");
        Ok(outcome)
    }

    /// Start a registered task with `args`, bound against its signature.
    ///
    /// While the task is running with cycles left (or unbounded) the request
    /// is logged and dropped; the current run's id is returned and nothing is
    /// sent.
    pub fn start(&self, name: &str, args: CallArgs) -> Result<RunId, ShuttleError> {
        self.ensure_open()?;
        let mut book = self.inner.mirror.lock();
        let Some(reg) = book.get_mut(name) else {
            warn!(target: "shuttle.controller", task = name, "start for unregistered task; dropped");
            return Err(ShuttleError::process(format!("task '{name}' is not registered")));
        };

        if reg.is_running()
            && let Some(current) = reg.run
        {
            warn!(
                target: "shuttle.controller",
                task = name,
                %current,
                cycles_already = reg.cycles_already,
                cycle_limit = reg.cycle_limit,
                "task is already running; start ignored"
            );
            return Ok(current);
        }

        let bound = reg.signature.bind(&args).inspect_err(|err| {
            warn!(target: "shuttle.controller", task = name, %err, "start arguments rejected");
        })?;

        let run = self.inner.ids.generate_run_id();
        self.send(Command::Start {
            name: TaskName::new(name),
            args: bound,
            run,
        })?;
        reg.begin(run);
        info!(target: "shuttle.controller", task = name, %run, "start requested");
        Ok(run)
    }

    /// Stop a task at its next cycle boundary and drop all of its listeners.
    /// A result already in flight is discarded rather than delivered.
    pub fn cancel(&self, name: &str) -> Result<(), ShuttleError> {
        self.ensure_open()?;
        let mut book = self.inner.mirror.lock();
        let Some(reg) = book.get_mut(name) else {
            warn!(target: "shuttle.controller", task = name, "cancel for unregistered task");
            return Err(ShuttleError::process(format!("task '{name}' is not registered")));
        };

        self.inner.listeners.cancel(name);
        self.send(Command::Stop {
            name: TaskName::new(name),
        })?;
        reg.active = false;
        info!(target: "shuttle.controller", task = name, "cancel requested");
        Ok(())
    }

    pub fn snapshot(&self, name: &str) -> Option<RegistrationSnapshot> {
        self.inner.mirror.lock().snapshot(name)
    }

    /// Every registration, sorted by name.
    pub fn snapshots(&self) -> Vec<RegistrationSnapshot> {
        self.inner.mirror.lock().snapshots()
    }

    pub fn counts(&self) -> EngineCounts {
        let book = self.inner.mirror.lock();
        EngineCounts {
            registered: book.len(),
            active: book.active_count(),
            listening: self.inner.listeners.listening_count(),
        }
    }

    /// Stop everything. Safe to call more than once; later calls return the
    /// first call's report.
    ///
    /// Order: watcher stop request, `stop-all`, command channel close, bounded
    /// join of the dispatch loop, then the optional reap of tracked task
    /// processes. Task threads are never joined.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut lifecycle = lock(&self.inner.lifecycle);
        let (watcher, worker) = match std::mem::replace(
            &mut *lifecycle,
            Lifecycle::Closed(ShutdownReport::default()),
        ) {
            Lifecycle::Closed(report) => {
                *lifecycle = Lifecycle::Closed(report.clone());
                return report;
            }
            Lifecycle::Running { watcher, worker } => (watcher, worker),
        };

        info!(target: "shuttle.controller", engine = %self.inner.engine_id, "shutting down");
        watcher.request_shutdown();

        if let Some(tx) = lock(&self.inner.commands).take()
            && tx.send(Command::StopAll).is_err()
        {
            debug!(target: "shuttle.controller", "worker already gone before stop-all");
        }

        let timeout = self.inner.config.shutdown_timeout();
        let worker_joined = worker.join_timeout(timeout);
        if !worker_joined {
            warn!(
                target: "shuttle.controller",
                timeout_ms = self.inner.config.shutdown_timeout_ms,
                "worker did not finish in time; leaving it detached"
            );
        }

        let reaped = match &self.inner.reaper {
            Some(reaper) if self.inner.config.reap_task_processes => {
                let pids = self.inner.processes.take_all();
                let ok = pids
                    .iter()
                    .fold(true, |ok, &pid| reaper.kill_tree(pid, ReapScope::WithRoot) && ok);
                info!(target: "shuttle.controller", count = pids.len(), ok, "reaped task processes");
                Some(ok)
            }
            _ => None,
        };

        let report = ShutdownReport {
            worker_joined,
            reaped,
        };
        *lifecycle = Lifecycle::Closed(report.clone());
        info!(target: "shuttle.controller", ?report, "shutdown complete");
        report
    }

    /// Wrap the host's close handler: closing the host shuts the engine down
    /// first, then runs whatever handler was installed before.
    pub fn bind_close<H: CloseHook + ?Sized>(&self, host: &mut H) {
        let previous = host.take_close_handler();
        let controller = self.clone();
        host.set_close_handler(Box::new(move || {
            controller.shutdown();
            if let Some(previous) = previous {
                previous();
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineBuilder;
    use crate::impls::HostQueue;
    use crate::domain::{ArgumentError, TaskResult};
    use crate::ports::CloseHandler;
    use crate::typed::{Callable, Param, Signature};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn engine() -> (Controller, crate::app::Renderer, HostQueue) {
        let config = EngineConfig::default()
            .with_poll_interval(5)
            .with_shutdown_timeout(Duration::from_secs(2));
        let (engine, queue) = EngineBuilder::new().config(config).build_with_queue().unwrap();
        let (controller, renderer) = engine.into_parts();
        (controller, renderer, queue)
    }

    async fn next(queue: &mut HostQueue) -> TaskResult {
        tokio::time::timeout(Duration::from_secs(5), queue.recv())
            .await
            .expect("result in time")
            .expect("queue open")
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn counter(limit: u32) -> CyclicTask {
        let n = Arc::new(AtomicUsize::new(0));
        CyclicTask::new(
            Callable::nullary(move || json!(n.fetch_add(1, Ordering::SeqCst))),
            limit,
        )
    }

    fn ticker(tag: &'static str) -> CyclicTask {
        CyclicTask::unbounded(Callable::nullary(move || {
            thread::sleep(Duration::from_millis(5));
            json!(tag)
        }))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bounded_task_yields_exactly_its_limit_in_order() {
        let (controller, _renderer, mut queue) = engine();
        assert_eq!(controller.register("count", counter(3)).unwrap(), RegisterOutcome::Added);
        controller.start("count", CallArgs::new()).unwrap();

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(next(&mut queue).await.payload()[0].clone());
        }
        assert_eq!(got, vec![json!(0), json!(1), json!(2)]);

        wait_until(|| !controller.snapshot("count").unwrap().active).await;
        let snap = controller.snapshot("count").unwrap();
        assert_eq!(snap.cycles_already, 3);
        assert_eq!(snap.remaining(), Some(0));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.try_recv().is_none());
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_unbounded_task_delivers_nothing_more() {
        let (controller, renderer, mut queue) = engine();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        renderer.on("tick", move |_: &[Value]| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        controller.register("tick", ticker("t")).unwrap();
        controller.start("tick", CallArgs::new()).unwrap();
        for _ in 0..3 {
            queue.dispatch_next(&renderer).await.unwrap();
        }
        controller.cancel("tick").unwrap();
        let at_cancel = seen.load(Ordering::SeqCst);
        assert_eq!(at_cancel, 3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.dispatch_pending(&renderer);
        assert_eq!(seen.load(Ordering::SeqCst), at_cancel);
        assert_eq!(renderer.listener_count("tick"), 0);
        assert!(!controller.snapshot("tick").unwrap().active);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_of_unknown_name_is_rejected_every_time() {
        let (controller, _renderer, mut queue) = engine();
        for _ in 0..2 {
            let err = controller.start("ghost", CallArgs::new()).unwrap_err();
            assert!(matches!(err, ShuttleError::Process(_)));
        }
        assert!(matches!(controller.cancel("ghost"), Err(ShuttleError::Process(_))));
        assert!(controller.snapshot("ghost").is_none());
        assert_eq!(controller.counts().registered, 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(queue.try_recv().is_none());
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reregistering_a_running_unbounded_task_is_ignored() {
        let (controller, _renderer, mut queue) = engine();
        controller.register("tick", ticker("old")).unwrap();
        controller.start("tick", CallArgs::new()).unwrap();
        assert_eq!(next(&mut queue).await.payload(), &[json!("old")]);

        assert_eq!(
            controller.register("tick", ticker("new")).unwrap(),
            RegisterOutcome::Rejected
        );
        for _ in 0..3 {
            assert_eq!(next(&mut queue).await.payload(), &[json!("old")]);
        }
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn arguments_that_do_not_bind_dispatch_nothing() {
        let (controller, _renderer, mut queue) = engine();
        let signature = Signature::new([
            Param::required("a"),
            Param::required("b"),
            Param::required("c"),
        ])
        .unwrap();
        let called = Arc::new(AtomicBool::new(false));
        let c = Arc::clone(&called);
        let task = CyclicTask::once(Callable::new(signature, move |_| {
            c.store(true, Ordering::SeqCst);
            Value::Null
        }));
        controller.register("three", task).unwrap();

        let err = controller
            .start("three", CallArgs::positional([1, 2]))
            .unwrap_err();
        assert!(matches!(
            err,
            ShuttleError::Arguments(ArgumentError::Missing(ref p)) if p == "c"
        ));
        assert!(!controller.snapshot("three").unwrap().active);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.try_recv().is_none());
        assert!(!called.load(Ordering::SeqCst));
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_binds_positional_named_and_default_values() {
        let (controller, _renderer, mut queue) = engine();
        let signature = Signature::new([
            Param::required("path"),
            Param::optional("mode", "r"),
            Param::optional("limit", 10),
        ])
        .unwrap();
        let task = CyclicTask::once(Callable::new(signature, |args| {
            json!([args.get(0), args.named("mode"), args.named("limit")])
        }));
        controller.register("open", task).unwrap();
        controller
            .start("open", CallArgs::new().arg("/tmp/x").kwarg("limit", 3))
            .unwrap();

        let result = next(&mut queue).await;
        assert_eq!(result.payload(), &[json!("/tmp/x"), json!("r"), json!(3)]);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn both_listeners_fire_then_one_keeps_receiving() {
        let (controller, renderer, mut queue) = engine();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = Arc::clone(&log);
        let first = renderer.on("pair", move |p: &[Value]| l1.lock().unwrap().push(format!("a{}", p[0])));
        let l2 = Arc::clone(&log);
        renderer.on("pair", move |p: &[Value]| l2.lock().unwrap().push(format!("b{}", p[0])));

        controller.register("pair", counter(2)).unwrap();
        controller.start("pair", CallArgs::new()).unwrap();

        queue.dispatch_next(&renderer).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a0", "b0"]);

        assert!(renderer.remove("pair", first));
        queue.dispatch_next(&renderer).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a0", "b0", "b1"]);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_then_register_again_starts_clean() {
        let (controller, renderer, mut queue) = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        renderer.on("job", move |p: &[Value]| s.lock().unwrap().push(p[0].clone()));
        controller.register("job", ticker("first")).unwrap();
        controller.start("job", CallArgs::new()).unwrap();
        queue.dispatch_next(&renderer).await.unwrap();
        controller.cancel("job").unwrap();

        // 前回の in-flight 結果を流してしまう
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.dispatch_pending(&renderer);
        assert_eq!(*seen.lock().unwrap(), vec![json!("first")]);

        assert_eq!(controller.register("job", counter(2)).unwrap(), RegisterOutcome::Modified);
        let snap = controller.snapshot("job").unwrap();
        assert_eq!((snap.cycles_already, snap.cycle_limit, snap.active), (0, 2, false));

        let s = Arc::clone(&seen);
        renderer.on("job", move |p: &[Value]| s.lock().unwrap().push(p[0].clone()));
        controller.start("job", CallArgs::new()).unwrap();
        let mut got = Vec::new();
        for _ in 0..2 {
            let r = tokio::time::timeout(Duration::from_secs(5), queue.dispatch_next(&renderer))
                .await
                .unwrap()
                .unwrap();
            got.push(r.payload()[0].clone());
        }
        assert_eq!(got, vec![json!(0), json!(1)]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!("first"), json!(0), json!(1)]
        );
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_mid_cycle_is_bounded() {
        #[derive(Default)]
        struct Recording(Mutex<Vec<(u32, ReapScope)>>);
        impl ProcessReaper for Recording {
            fn kill_tree(&self, pid: u32, scope: ReapScope) -> bool {
                self.0.lock().unwrap().push((pid, scope));
                true
            }
        }

        let reaper = Arc::new(Recording::default());
        let config = EngineConfig::default()
            .with_poll_interval(5)
            .with_shutdown_timeout(Duration::from_millis(500))
            .with_reap_task_processes(true);
        let (engine, _queue) = EngineBuilder::new()
            .config(config)
            .reaper(reaper.clone())
            .build_with_queue()
            .unwrap();
        let controller = engine.controller().clone();

        let entered = Arc::new(AtomicBool::new(false));
        let e = Arc::clone(&entered);
        controller
            .register(
                "slow",
                CyclicTask::unbounded(Callable::nullary(move || {
                    e.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_secs(30));
                    Value::Null
                })),
            )
            .unwrap();
        controller.start("slow", CallArgs::new()).unwrap();
        wait_until(|| entered.load(Ordering::SeqCst)).await;
        let processes = controller.processes();
        processes.track(4242);

        let started = Instant::now();
        let report = tokio::task::spawn_blocking(move || controller.shutdown())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(report.worker_joined);
        assert_eq!(report.reaped, Some(true));
        assert_eq!(*reaper.0.lock().unwrap(), vec![(4242, ReapScope::WithRoot)]);
        assert!(processes.tracked().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_reaps_task_processes_and_spares_unrelated_children() {
        use crate::app::TrackedChild;
        use crate::impls::SysinfoReaper;
        use std::process::Command;

        let config = EngineConfig::default()
            .with_poll_interval(5)
            .with_reap_task_processes(true);
        let (engine, mut queue) = EngineBuilder::new()
            .config(config)
            .reaper(Arc::new(SysinfoReaper::new()))
            .build_with_queue()
            .unwrap();
        let controller = engine.controller().clone();

        let mut unrelated = Command::new("sleep").arg("30").spawn().unwrap();

        let held: Arc<Mutex<Option<TrackedChild>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&held);
        let processes = controller.processes();
        controller
            .register(
                "spawner",
                CyclicTask::once(Callable::nullary(move || {
                    let child = processes.spawn(Command::new("sleep").arg("30")).unwrap();
                    let pid = child.id();
                    *slot.lock().unwrap() = Some(child);
                    json!(pid)
                })),
            )
            .unwrap();
        controller.start("spawner", CallArgs::new()).unwrap();
        let pid = next(&mut queue).await.payload()[0].as_u64().unwrap() as u32;
        assert_eq!(controller.processes().tracked(), vec![pid]);

        let report = tokio::task::spawn_blocking(move || controller.shutdown())
            .await
            .unwrap();
        assert_eq!(report.reaped, Some(true));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let exited = held.lock().unwrap().as_mut().unwrap().try_wait().unwrap();
            if exited.is_some() {
                break;
            }
            assert!(Instant::now() < deadline, "task process survived shutdown");
            thread::sleep(Duration::from_millis(20));
        }
        assert!(unrelated.try_wait().unwrap().is_none());

        unrelated.kill().unwrap();
        unrelated.wait().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_while_running_is_ignored() {
        let (controller, _renderer, mut queue) = engine();
        let n = Arc::new(AtomicUsize::new(0));
        let slow = CyclicTask::new(
            Callable::nullary(move || {
                thread::sleep(Duration::from_millis(40));
                json!(n.fetch_add(1, Ordering::SeqCst))
            }),
            3,
        );
        controller.register("slow", slow).unwrap();

        let first = controller.start("slow", CallArgs::new()).unwrap();
        assert_eq!(next(&mut queue).await.payload(), &[json!(0)]);
        let again = controller.start("slow", CallArgs::new()).unwrap();
        assert_eq!(again, first);

        for expected in 1..3 {
            assert_eq!(next(&mut queue).await.payload(), &[json!(expected)]);
        }
        wait_until(|| !controller.snapshot("slow").unwrap().active).await;
        let snap = controller.snapshot("slow").unwrap();
        assert_eq!((snap.cycles_already, snap.run), (3, Some(first)));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(queue.try_recv().is_none());
        assert_eq!(controller.register("slow", counter(1)).unwrap(), RegisterOutcome::Modified);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finished_bounded_task_starts_a_fresh_run() {
        let (controller, _renderer, mut queue) = engine();
        controller.register("count", counter(2)).unwrap();

        let first = controller.start("count", CallArgs::new()).unwrap();
        for _ in 0..2 {
            next(&mut queue).await;
        }
        wait_until(|| !controller.snapshot("count").unwrap().active).await;

        let second = controller.start("count", CallArgs::new()).unwrap();
        assert_ne!(second, first);
        let got: Vec<_> = [next(&mut queue).await, next(&mut queue).await]
            .iter()
            .map(|r| r.payload()[0].clone())
            .collect();
        assert_eq!(got, vec![json!(2), json!(3)]);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_of_a_cancelled_run_leaves_the_next_run_active() {
        let (controller, _renderer, mut queue) = engine();
        let slow = |tag: &'static str| {
            CyclicTask::unbounded(Callable::nullary(move || {
                thread::sleep(Duration::from_millis(40));
                json!(tag)
            }))
        };
        controller.register("job", slow("first")).unwrap();
        controller.start("job", CallArgs::new()).unwrap();
        next(&mut queue).await;
        controller.cancel("job").unwrap();

        // 前の run のスレッドはまだ cycle の途中
        assert_eq!(controller.register("job", slow("second")).unwrap(), RegisterOutcome::Modified);
        let second = controller.start("job", CallArgs::new()).unwrap();

        assert_eq!(next(&mut queue).await.payload(), &[json!("second")]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snap = controller.snapshot("job").unwrap();
        assert!(snap.active);
        assert_eq!(snap.run, Some(second));
        assert!(snap.cycles_already >= 1);
        assert_eq!(controller.register("job", counter(1)).unwrap(), RegisterOutcome::Rejected);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_task_does_not_stay_active() {
        let (controller, _renderer, mut queue) = engine();
        controller
            .register(
                "boom",
                CyclicTask::new(Callable::nullary(|| panic!("boom")), 2),
            )
            .unwrap();
        controller.start("boom", CallArgs::new()).unwrap();

        wait_until(|| !controller.snapshot("boom").unwrap().active).await;
        assert_eq!(controller.snapshot("boom").unwrap().cycles_already, 0);
        assert!(queue.try_recv().is_none());
        assert_eq!(controller.register("boom", counter(1)).unwrap(), RegisterOutcome::Modified);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_is_idempotent_and_closes_every_operation() {
        let (controller, _renderer, _queue) = engine();
        controller.register("t", counter(1)).unwrap();

        let first = controller.shutdown();
        assert!(first.worker_joined);
        assert_eq!(first.reaped, None);
        assert_eq!(controller.shutdown(), first);
        assert!(controller.is_closed());

        assert!(matches!(controller.register("t", counter(1)), Err(ShuttleError::Operation(_))));
        assert!(matches!(controller.start("t", CallArgs::new()), Err(ShuttleError::Operation(_))));
        assert!(matches!(controller.cancel("t"), Err(ShuttleError::Operation(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blank_names_are_registration_errors() {
        let (controller, _renderer, _queue) = engine();
        assert!(matches!(
            controller.register("  ", counter(1)),
            Err(ShuttleError::Registration(_))
        ));
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counts_track_registrations_and_listeners() {
        let (controller, renderer, _queue) = engine();
        controller.register("a", ticker("a")).unwrap();
        controller.register("b", counter(1)).unwrap();
        renderer.on("a", |_: &[Value]| {});
        controller.start("a", CallArgs::new()).unwrap();

        assert_eq!(
            controller.counts(),
            EngineCounts {
                registered: 2,
                active: 1,
                listening: 1
            }
        );
        let names: Vec<_> = controller
            .snapshots()
            .into_iter()
            .map(|s| s.name.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        controller.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bind_close_shuts_down_before_the_original_handler() {
        #[derive(Default)]
        struct Window {
            on_close: Option<CloseHandler>,
        }
        impl CloseHook for Window {
            fn take_close_handler(&mut self) -> Option<CloseHandler> {
                self.on_close.take()
            }
            fn set_close_handler(&mut self, handler: CloseHandler) {
                self.on_close = Some(handler);
            }
        }

        let (controller, _renderer, _queue) = engine();
        let closed_first = Arc::new(AtomicBool::new(false));
        let mut window = Window::default();
        let probe = controller.clone();
        let flag = Arc::clone(&closed_first);
        window.set_close_handler(Box::new(move || flag.store(probe.is_closed(), Ordering::SeqCst)));

        controller.bind_close(&mut window);
        let handler = window.take_close_handler().unwrap();
        tokio::task::spawn_blocking(handler).await.unwrap();

        assert!(controller.is_closed());
        assert!(closed_first.load(Ordering::SeqCst));
    }
}
