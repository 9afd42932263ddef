//! ResultWatcher - result queue をポーリングしてホストに渡すループ
//!
//! # フロー
//! 1. result queue を `try_recv()` で確認
//! 2. 空なら poll interval だけ待つ（shutdown と競合させる）
//! 3. 結果があれば mirror の cycle 数を進めて HostSink に post
//! 4. run 終了通知は mirror の `active` を落とすだけ（ホストには渡さない）
//!
//! Only the `HostSink::post` call crosses into host territory; listener
//! dispatch happens later, on the host's own thread.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mirror::RegistrationMirror;
use crate::domain::{RunEnd, RunEvent};
use crate::ports::HostSink;
use crate::queue::ResultReceiver;

/// Watcher handle.
/// - `request_shutdown()` でループに停止を伝える（次の iteration で抜ける）
/// - `shutdown_and_join()` で停止完了まで待てる
pub struct ResultWatcher {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ResultWatcher {
    pub(crate) fn spawn(
        runtime: &Handle,
        results: ResultReceiver,
        sink: Arc<dyn HostSink>,
        mirror: Arc<RegistrationMirror>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = runtime.spawn(watch_loop(results, sink, mirror, interval, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Ask the loop to stop. Does not wait.
    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_active(&self) -> bool {
        !self.join.is_finished()
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn watch_loop(
    mut results: ResultReceiver,
    sink: Arc<dyn HostSink>,
    mirror: Arc<RegistrationMirror>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    debug!(target: "shuttle.watcher", interval_ms, "watching results");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match results.try_recv() {
            Ok(RunEvent::Cycle(result)) => {
                if !mirror.observe_cycle(result.name(), result.run()) {
                    debug!(target: "shuttle.watcher", task = %result.name(), "result of a superseded run");
                }
                sink.post(result);
            }
            Ok(RunEvent::Ended { name, run, reason }) => {
                let current = mirror.observe_end(&name, run);
                match reason {
                    RunEnd::Panicked => {
                        warn!(target: "shuttle.watcher", task = %name, %run, current, "run ended by a panic")
                    }
                    _ => debug!(target: "shuttle.watcher", task = %name, %run, ?reason, current, "run ended"),
                }
            }
            Err(TryRecvError::Empty) => {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
    info!(target: "shuttle.watcher", "result watcher stopped");
}
