use thiserror::Error;

/// Errors raised at the controller boundary and inside the worker.
///
/// Classification:
/// - `Registration`: the task itself is unusable (bad name, bad signature)
/// - `Process`: the request references a task name that was never registered
/// - `Operation`: the request is valid but not allowed right now
///   (mutating a running task, engine already shut down, bad config document)
/// - `Arguments`: start arguments do not bind to the declared signature
#[derive(Debug, Error)]
pub enum ShuttleError {
    #[error("registration failed: {0}")]
    Registration(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("operation error: {0}")]
    Operation(String),

    #[error("argument error: {0}")]
    Arguments(#[from] ArgumentError),
}

impl ShuttleError {
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }
}

/// Why a set of call arguments could not be bound to a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("takes at most {max} positional arguments but {given} were given")]
    TooManyPositional { max: usize, given: usize },

    #[error("missing required argument '{0}'")]
    Missing(String),

    #[error("unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),

    #[error("got multiple values for argument '{0}'")]
    Duplicate(String),
}
