//! Ports - 外部との境界
//!
//! 各 trait はエンジンの外側にあるもの（時刻、ID、ホストのイベントループ、
//! プロセス管理）へのインターフェースで、実装は `impls` かホスト側が持つ。

pub mod clock;
pub mod host;
pub mod id_generator;
pub mod reaper;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::host::{CloseHandler, CloseHook, EventPump, HostSink, NoopPump};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::reaper::{ProcessReaper, ReapScope};
