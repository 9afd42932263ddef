//! Callable - タスク本体（関数 + 引数宣言）

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::signature::{BoundArgs, Signature};

type TaskFn = dyn Fn(&BoundArgs) -> Value + Send + Sync;

/// A task body together with its declared signature.
///
/// Cloning is cheap (shared `Arc`): every cycle of a cyclic task hands out a
/// clone of the same underlying function.
///
/// The return value becomes the result payload. A JSON array is spread into
/// several payload values, anything else is delivered as a single value.
///
/// Callables are never interrupted. A body that blocks forever keeps its
/// runner busy until the host process exits.
#[derive(Clone)]
pub struct Callable {
    func: Arc<TaskFn>,
    signature: Arc<Signature>,
}

impl Callable {
    pub fn new<F>(signature: Signature, f: F) -> Self
    where
        F: Fn(&BoundArgs) -> Value + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(f),
            signature: Arc::new(signature),
        }
    }

    /// Shorthand for a callable without parameters.
    pub fn nullary<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::new(Signature::empty(), move |_| f())
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(&self, args: &BoundArgs) -> Value {
        (self.func)(args)
    }

    /// True when both handles point at the same function.
    pub fn same_body(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("arity", &self.signature.arity())
            .finish_non_exhaustive()
    }
}
