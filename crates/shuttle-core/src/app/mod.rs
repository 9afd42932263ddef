//! App - アプリケーション層
//!
//! このモジュールは、ports と queue を組み合わせてエンジンを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **Controller**: ホスト側の操作窓口（register / start / cancel / shutdown）
//! - **WorkerProcess**: コマンドを適用する常駐ループ（専用スレッド）
//! - **TaskRunner**: 1 タスク分の実行スレッドと running フラグ
//! - **ResultWatcher**: result queue をポーリングしてホストに渡すループ
//! - **Renderer / ListenerRegistry**: タスク名ごとのコールバック配送
//! - **ProcessTracker**: タスク本体が起動した子プロセスの記録（shutdown 時の reap 対象）

pub mod builder;
pub mod config;
pub mod controller;
pub mod listeners;
mod mirror;
pub mod processes;
pub mod runner;
pub mod status;
pub mod watcher_loop;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::config::EngineConfig;
pub use self::controller::{Controller, RegisterOutcome, ShutdownReport};
pub use self::listeners::{CallController, Callback, ListenerRegistry, Renderer};
pub use self::processes::{ProcessTracker, TrackedChild};
pub use self::runner::TaskRunner;
pub use self::status::{EngineCounts, RegistrationSnapshot};
pub use self::watcher_loop::ResultWatcher;
pub use self::worker_loop::{WorkerHandle, WorkerProcess};
