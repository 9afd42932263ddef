//! Status - ホスト側から見たタスクの状態（読み取り専用）
//!
//! These are copies, not views into live state. The worker registry stays
//! authoritative for execution; the controller mirror only tracks what the
//! host has asked for and how many results it has seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{RunId, TaskName};
use crate::typed::Signature;

/// Controller-side metadata for one registered task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSnapshot {
    pub name: TaskName,

    /// 0 = unbounded.
    pub cycle_limit: u32,

    /// Results observed since the last start.
    pub cycles_already: u32,

    /// Started, and neither cancelled nor exhausted.
    pub active: bool,

    pub registered_at: DateTime<Utc>,

    pub signature: Signature,

    /// Latest start, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunId>,
}

impl RegistrationSnapshot {
    /// Cycles left in the current run; `None` when unbounded.
    pub fn remaining(&self) -> Option<u32> {
        (self.cycle_limit > 0).then(|| self.cycle_limit.saturating_sub(self.cycles_already))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounts {
    pub registered: usize,
    pub active: usize,
    pub listening: usize,
}
