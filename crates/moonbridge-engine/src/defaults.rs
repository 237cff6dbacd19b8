//! Default constants for state configuration.

use std::ffi::CStr;

/// Chunk name used when source text cannot serve as its own name.
pub const DEFAULT_CHUNK_NAME: &CStr = c"=[string]";

/// Collector pause of a fresh Lua 5.4 state (percent).
pub const DEFAULT_GC_PAUSE: i32 = 200;

/// Collector step multiplier of a fresh Lua 5.4 state.
pub const DEFAULT_GC_STEP_MUL: i32 = 100;

/// Extra stack slots reserved before pushing call arguments.
pub const CALL_STACK_SLACK: i32 = 2;

/// Chunk mode accepting source text and precompiled chunks.
pub const ANY_CHUNK: &CStr = c"bt";

/// Chunk mode accepting source text only.
pub const TEXT_ONLY: &CStr = c"t";
