//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 構築されるもの
//! - command / result queue（エンジンごとに 1 組、グローバル状態なし）
//! - WorkerProcess（専用スレッド）
//! - ResultWatcher（tokio task）
//! - Controller と Renderer（ホスト側の窓口）
//!
//! # Fail-fast 設計
//! - tokio runtime の外で build() すると `BuildError::NoRuntime`
//! - HostSink が無いと `BuildError::MissingHostSink`
//! - ワーカースレッドが起動できないと `BuildError::Spawn`

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{info, warn};

use super::config::EngineConfig;
use super::controller::{Controller, ControllerWiring};
use super::listeners::{ListenerRegistry, Renderer};
use super::mirror::RegistrationMirror;
use super::processes::ProcessTracker;
use super::watcher_loop::ResultWatcher;
use super::worker_loop::WorkerProcess;
use crate::impls::{HostQueue, host_queue};
use crate::ports::{Clock, EventPump, HostSink, IdGenerator, NoopPump, ProcessReaper, SystemClock, UlidGenerator};
use crate::queue::{command_queue, result_queue};

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no tokio runtime; build inside a runtime or pass one with `runtime()`")]
    NoRuntime,

    #[error("no host sink configured; results would have nowhere to go")]
    MissingHostSink,

    #[error("failed to spawn the worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// # 使用例
/// ```ignore
/// let (engine, mut queue) = EngineBuilder::new()
///     .config(EngineConfig::default().with_poll_interval(50))
///     .build_with_queue()?;
/// let (controller, renderer) = engine.into_parts();
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    sink: Option<Arc<dyn HostSink>>,
    pump: Arc<dyn EventPump>,
    reaper: Option<Arc<dyn ProcessReaper>>,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            sink: None,
            pump: Arc::new(NoopPump),
            reaper: None,
            clock: Arc::new(SystemClock),
            runtime: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host_sink(mut self, sink: Arc<dyn HostSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn event_pump(mut self, pump: Arc<dyn EventPump>) -> Self {
        self.pump = pump;
        self
    }

    /// Used at shutdown only when `reap_task_processes` is on.
    pub fn reaper(mut self, reaper: Arc<dyn ProcessReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runtime that hosts the result watcher. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build with a fresh `HostQueue` as the host sink.
    pub fn build_with_queue(mut self) -> Result<(Engine, HostQueue), BuildError> {
        let (sink, queue) = host_queue();
        self.sink = Some(Arc::new(sink));
        Ok((self.build()?, queue))
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let sink = self.sink.ok_or(BuildError::MissingHostSink)?;
        if self.config.reap_task_processes && self.reaper.is_none() {
            warn!(target: "shuttle.engine", "reap_task_processes is on but no reaper is configured");
        }

        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&self.clock)));
        let engine_id = ids.generate_engine_id();

        let (commands_tx, commands_rx) = command_queue();
        let (results_tx, results_rx) = result_queue();

        let worker = WorkerProcess::spawn(commands_rx, results_tx)?;

        let mirror = Arc::new(RegistrationMirror::new());
        let listeners = Arc::new(ListenerRegistry::new(self.pump));
        let watcher = ResultWatcher::spawn(
            &runtime,
            results_rx,
            sink,
            Arc::clone(&mirror),
            self.config.poll_interval(),
        );

        info!(
            target: "shuttle.engine",
            engine = %engine_id,
            poll_interval_ms = self.config.poll_interval_ms,
            "engine started"
        );

        let controller = Controller::new(ControllerWiring {
            engine_id,
            commands: commands_tx,
            mirror,
            listeners: Arc::clone(&listeners),
            clock: self.clock,
            ids,
            config: self.config,
            watcher,
            worker,
            reaper: self.reaper,
            processes: ProcessTracker::new(),
        });

        Ok(Engine {
            controller,
            renderer: Renderer::new(listeners),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built engine: the controller drives tasks, the renderer manages
/// listeners. Both are cheap handles onto the same engine.
pub struct Engine {
    controller: Controller,
    renderer: Renderer,
}

impl Engine {
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn into_parts(self) -> (Controller, Renderer) {
        (self.controller, self.renderer)
    }
}
