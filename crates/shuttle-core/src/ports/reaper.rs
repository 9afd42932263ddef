//! ProcessReaper port - プロセスツリーの強制終了
//!
//! Shutdown uses this as the last resort: cooperative cancellation cannot
//! stop a callable that spawned child processes and blocks on them.

/// Which part of the tree to kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapScope {
    /// Only the descendants; the root process keeps running.
    Descendants,
    /// Descendants first, then the root.
    WithRoot,
}

pub trait ProcessReaper: Send + Sync {
    /// Kill the tree under `pid`. Returns `true` when every targeted process
    /// was signalled successfully. An empty tree, or a root that has already
    /// exited, counts as success.
    fn kill_tree(&self, pid: u32, scope: ReapScope) -> bool;
}
