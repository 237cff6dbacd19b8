//! Engine error types
//!
//! Failures reported by the VM itself (load and runtime errors) have already
//! been delivered to the registered error handler by the time one of these
//! values reaches the caller; they carry only the status, not the message.

use moonbridge_sdk::Status;

/// Result type for engine operations
pub type LuaResult<T> = Result<T, LuaError>;

/// Errors surfaced by the engine
#[derive(Debug, thiserror::Error)]
pub enum LuaError {
    /// The VM refused to create a new state (allocation failure)
    #[error("Failed to create Lua state")]
    StateCreation,

    /// Source text or file did not compile
    #[error("Load failed: {0}")]
    Load(Status),

    /// A protected call or coroutine resume failed
    #[error("Execution failed: {0}")]
    Runtime(Status),

    /// Value on the stack did not have the requested type
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Requested type
        expected: &'static str,
        /// Lua type name of the actual value
        got: String,
    },

    /// Table key the VM cannot store (nil or NaN)
    #[error("Invalid table key: {0}")]
    InvalidKey(&'static str),

    /// Name, path or chunk name with an embedded nul byte
    #[error("Interior nul byte in string passed to Lua")]
    InteriorNul(#[from] std::ffi::NulError),

    /// The VM could not grow its stack
    #[error("Stack overflow: cannot reserve {0} slots")]
    StackOverflow(i32),

    /// The thread is executing and cannot be resumed or reset
    #[error("Thread is running")]
    ThreadRunning,

    /// A handle from one Lua state was passed to another
    #[error("Value belongs to a different Lua state")]
    StateMismatch,
}

impl LuaError {
    /// VM status behind this error, for load and runtime failures.
    pub fn status(&self) -> Option<Status> {
        match self {
            LuaError::Load(status) | LuaError::Runtime(status) => Some(*status),
            _ => None,
        }
    }
}
