//! HostQueue - チャネルで結果をホストスレッドに渡す HostSink 実装
//!
//! # 実装詳細
//! - 送信側 (`HostQueueSender`) は watcher が持つ `HostSink`
//! - 受信側 (`HostQueue`) はホストのスレッドで drain して Renderer に配送する
//!
//! # 使用例
//! ```ignore
//! let (sink, mut queue) = host_queue();
//! // ... engine built with `sink` ...
//! queue.dispatch_pending(&renderer); // ホストのイベントループの中で
//! ```

use tokio::sync::mpsc;
use tracing::trace;

use crate::app::Renderer;
use crate::domain::TaskResult;
use crate::ports::HostSink;

pub fn host_queue() -> (HostQueueSender, HostQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostQueueSender { tx }, HostQueue { rx })
}

#[derive(Clone)]
pub struct HostQueueSender {
    tx: mpsc::UnboundedSender<TaskResult>,
}

impl HostSink for HostQueueSender {
    fn post(&self, result: TaskResult) {
        if let Err(err) = self.tx.send(result) {
            trace!(target: "shuttle.host", task = %err.0.name(), "host queue closed; result dropped");
        }
    }
}

pub struct HostQueue {
    rx: mpsc::UnboundedReceiver<TaskResult>,
}

impl HostQueue {
    /// Wait for the next result. `None` once the watcher side is gone.
    pub async fn recv(&mut self) -> Option<TaskResult> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TaskResult> {
        self.rx.try_recv().ok()
    }

    /// Dispatch everything that has arrived so far. Returns how many results
    /// were taken off the queue (delivered or not).
    pub fn dispatch_pending(&mut self, renderer: &Renderer) -> usize {
        let mut n = 0;
        while let Some(result) = self.try_recv() {
            renderer.dispatch(&result);
            n += 1;
        }
        n
    }

    /// Wait for one result, dispatch it, and hand it back.
    pub async fn dispatch_next(&mut self, renderer: &Renderer) -> Option<TaskResult> {
        let result = self.recv().await?;
        renderer.dispatch(&result);
        Some(result)
    }
}
