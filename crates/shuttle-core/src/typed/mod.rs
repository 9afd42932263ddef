//! Typed - タスク本体の型付き API
//!
//! - **Signature / CallArgs / BoundArgs**: 引数宣言と束縛（登録時に宣言、start 時に検証）
//! - **Callable**: `Fn(&BoundArgs) -> Value` + Signature
//! - **CyclicTask**: Callable を N 回（0 = 無限）繰り返す遅延シーケンス

pub mod callable;
pub mod cyclic;
pub mod signature;

pub use self::callable::Callable;
pub use self::cyclic::CyclicTask;
pub use self::signature::{BoundArgs, CallArgs, Param, Signature};
