//! VM status codes
//!
//! Values match `lua.h` / `lauxlib.h` for Lua 5.4. The engine checks the
//! mapping against the C headers in its own tests.

use std::fmt;

/// Outcome of a VM-level operation, as reported by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `LUA_OK`
    Ok,
    /// `LUA_YIELD`: a coroutine suspended itself
    Yield,
    /// `LUA_ERRRUN`: error raised while running code
    RuntimeError,
    /// `LUA_ERRSYNTAX`: the source did not compile
    SyntaxError,
    /// `LUA_ERRMEM`: the allocator refused a request
    MemoryError,
    /// `LUA_ERRERR`: the message handler itself failed
    MessageHandlerError,
    /// `LUA_ERRFILE`: a source file could not be opened or read
    FileError,
    /// Any code this binding does not know about
    Other(i32),
}

impl Status {
    /// Map a raw status code to a [`Status`].
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            1 => Status::Yield,
            2 => Status::RuntimeError,
            3 => Status::SyntaxError,
            4 => Status::MemoryError,
            5 => Status::MessageHandlerError,
            6 => Status::FileError,
            other => Status::Other(other),
        }
    }

    /// The raw status code.
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Yield => 1,
            Status::RuntimeError => 2,
            Status::SyntaxError => 3,
            Status::MemoryError => 4,
            Status::MessageHandlerError => 5,
            Status::FileError => 6,
            Status::Other(code) => code,
        }
    }

    /// True for every status other than `Ok` and `Yield`.
    pub fn is_error(self) -> bool {
        !matches!(self, Status::Ok | Status::Yield)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Yield => write!(f, "yield"),
            Status::RuntimeError => write!(f, "runtime error"),
            Status::SyntaxError => write!(f, "syntax error"),
            Status::MemoryError => write!(f, "memory error"),
            Status::MessageHandlerError => write!(f, "error in message handler"),
            Status::FileError => write!(f, "file error"),
            Status::Other(code) => write!(f, "status {}", code),
        }
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status::from_code(code)
    }
}
