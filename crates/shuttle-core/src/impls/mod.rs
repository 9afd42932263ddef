//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HostQueue**: チャネル経由でホストスレッドに結果を渡す HostSink
//! - **SysinfoReaper**: sysinfo を使った ProcessReaper

pub mod host_queue;
pub mod sysinfo_reaper;

pub use self::host_queue::{HostQueue, HostQueueSender, host_queue};
pub use self::sysinfo_reaper::SysinfoReaper;
