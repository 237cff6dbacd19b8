//! Reference handles
//!
//! A handle denotes one value living in the VM's managed value space. It
//! holds a slot in the Lua registry, so the value stays reachable (and is
//! not collected) for as long as the handle exists, and can be pushed back
//! onto the stack on demand.
//!
//! Handles borrow the [`LuaState`](crate::LuaState) they came from. For
//! states wrapped with [`LuaState::from_raw`](crate::LuaState::from_raw),
//! the caller must also keep the underlying VM open while handles exist.

mod function;
mod reference;
mod table;
mod thread;

pub use function::LuaFunction;
pub use reference::{LuaRef, LuaType};
pub use table::{LuaTable, TableKey};
pub use thread::{LuaThread, ThreadStatus};
