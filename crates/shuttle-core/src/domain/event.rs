//! RunEvent - タスク用スレッドから watcher へ流れるもの
//!
//! - `Cycle`: 1 サイクル分の結果（ホストへ転送される）
//! - `Ended`: 実行スレッドの終了通知（ホストへは転送せず mirror だけ更新）

use serde::{Deserialize, Serialize};

use super::ids::{RunId, TaskName};
use super::result::TaskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    /// Every cycle of a bounded run was delivered.
    Exhausted,
    /// The running flag was cleared by a stop.
    Cancelled,
    /// The callable panicked.
    Panicked,
    /// The result queue was closed under the run.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Cycle(TaskResult),
    Ended {
        name: TaskName,
        run: RunId,
        reason: RunEnd,
    },
}

impl RunEvent {
    pub fn name(&self) -> &TaskName {
        match self {
            Self::Cycle(result) => result.name(),
            Self::Ended { name, .. } => name,
        }
    }

    pub fn run(&self) -> Option<RunId> {
        match self {
            Self::Cycle(result) => result.run(),
            Self::Ended { run, .. } => Some(*run),
        }
    }

    /// The result carried by a `Cycle`, if any.
    pub fn into_result(self) -> Option<TaskResult> {
        match self {
            Self::Cycle(result) => Some(result),
            Self::Ended { .. } => None,
        }
    }
}

impl From<TaskResult> for RunEvent {
    fn from(result: TaskResult) -> Self {
        Self::Cycle(result)
    }
}
