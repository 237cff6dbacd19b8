//! Moonbridge engine
//!
//! Embeds a Lua 5.4 VM and keeps the host/VM boundary honest:
//!
//! - [`LuaState`]: VM lifecycle (owned or borrowed), library loading, the
//!   load/execute protocol with optional environment override
//! - [`StackGuard`]: scoped restoration of the operand stack height
//! - [`ErrorHandlerRegistry`]: process-wide `(status, message)` reporting
//!   keyed by VM
//! - [`LuaRef`], [`LuaTable`], [`LuaFunction`], [`LuaThread`]: handles to
//!   values living inside the VM
//! - [`Gc`]: collector controls
//!
//! # Example
//!
//! ```ignore
//! use moonbridge_engine::LuaState;
//!
//! let lua = LuaState::new()?;
//! let out = lua.eval("return 1 + 1")?;
//! assert_eq!(out[0].get::<i64>()?, 2);
//!
//! let sandbox = lua.new_table()?;
//! assert!(!lua.do_string_in("print('hi')", &sandbox));
//! ```

mod alloc;
pub mod convert;
pub mod defaults;
pub mod error;
pub mod error_handler;
pub mod gc;
pub mod libs;
pub mod options;
mod protect;
pub mod refs;
pub mod stack;
pub mod state;

pub use convert::{FromLua, IntoLua, IntoLuaArgs, Nil};
pub use error::{LuaError, LuaResult};
pub use error_handler::{default_handler, ErrorHandlerFn, ErrorHandlerRegistry};
pub use gc::Gc;
pub use libs::{lib_by_name, standard_libs, LoadLib};
pub use options::{GcMode, GcSettings, Libraries, StateOptions};
pub use refs::{LuaFunction, LuaRef, LuaTable, LuaThread, LuaType, TableKey, ThreadStatus};
pub use stack::StackGuard;
pub use state::LuaState;

pub use moonbridge_sdk::{AllocStats, HostAllocator, Status, SystemAllocator, TrackingAllocator};

/// Raw Lua 5.4 C API
pub use mlua_sys as ffi;
