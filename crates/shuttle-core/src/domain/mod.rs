//! Domain model (ids, errors, commands, results, run events).

pub mod command;
pub mod errors;
pub mod event;
pub mod ids;
pub mod result;

pub use self::command::Command;
pub use self::errors::{ArgumentError, ShuttleError};
pub use self::event::{RunEnd, RunEvent};
pub use self::ids::{EngineId, Id, IdMarker, ListenerId, RunId, TaskName};
pub use self::result::TaskResult;
