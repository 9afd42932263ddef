//! shuttle-core
//!
//! Background task engine: a host registers named, repeatable tasks, starts
//! and cancels them by name, and receives each cycle's result on its own
//! thread through named listeners.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, command, result, event, errors）
//! - **typed**: 型付きタスク API（Signature, Callable, CyclicTask）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, HostSink, EventPump, CloseHook, ProcessReaper）
//! - **queue**: command / result queue（エンジンごとに 1 組）
//! - **app**: エンジン本体（builder, controller, worker_loop, runner, watcher_loop, listeners）
//! - **impls**: ports の実装（HostQueue, SysinfoReaper）
//! - **observability**: tracing subscriber の初期化
//!
//! Cancellation is cooperative only: a stop takes effect between cycles, and
//! a callable that never returns cannot be interrupted.

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod typed;

pub use app::{Controller, Engine, EngineBuilder, EngineConfig, Renderer};
pub use domain::{ShuttleError, TaskName, TaskResult};
pub use typed::{CallArgs, Callable, CyclicTask, Param, Signature};
