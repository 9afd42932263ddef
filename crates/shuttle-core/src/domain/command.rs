//! Command - コントローラーからワーカーへの命令
//!
//! Wire shape (tag first, FIFO, no acknowledgement):
//! - `("add", name, task)`
//! - `("modify", name, task)`
//! - `("start", name, args, kwargs)`
//! - `("stop", name)`
//! - `("stop-all",)`
//!
//! Commands carry closures, so they only travel over in-process channels.

use std::fmt;

use super::ids::{RunId, TaskName};
use crate::typed::{BoundArgs, CyclicTask};

pub enum Command {
    /// Register a new runner.
    Add { name: TaskName, task: CyclicTask },

    /// Replace the task behind an existing runner.
    Modify { name: TaskName, task: CyclicTask },

    /// Start the runner. Arguments were bound on the host side, so positional
    /// and named values are already merged in declaration order.
    Start {
        name: TaskName,
        args: BoundArgs,
        run: RunId,
    },

    /// Cooperatively stop one runner.
    Stop { name: TaskName },

    /// Cooperatively stop every runner (shutdown only).
    StopAll,
}

impl Command {
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Modify { .. } => "modify",
            Command::Start { .. } => "start",
            Command::Stop { .. } => "stop",
            Command::StopAll => "stop-all",
        }
    }

    pub fn task_name(&self) -> Option<&TaskName> {
        match self {
            Command::Add { name, .. }
            | Command::Modify { name, .. }
            | Command::Start { name, .. }
            | Command::Stop { name } => Some(name),
            Command::StopAll => None,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task_name() {
            Some(name) => write!(f, "({}, {})", self.tag(), name),
            None => write!(f, "({},)", self.tag()),
        }
    }
}
