//! Library preload entries
//!
//! A [`LoadLib`] pairs a module name with its `luaopen_*` function. Opening
//! one goes through `luaL_requiref`, so the module lands both in
//! `package.loaded` and as a global of the same name.

use std::borrow::Cow;
use std::fmt;

use mlua_sys::{
    lua_CFunction, luaopen_base, luaopen_coroutine, luaopen_debug, luaopen_io, luaopen_math,
    luaopen_os, luaopen_package, luaopen_string, luaopen_table, luaopen_utf8,
};

/// A `(name, loader)` pair applied by the library preload.
#[derive(Clone)]
pub struct LoadLib {
    name: Cow<'static, str>,
    loader: lua_CFunction,
}

impl LoadLib {
    /// Create an entry for a custom module.
    pub fn new(name: impl Into<Cow<'static, str>>, loader: lua_CFunction) -> Self {
        Self {
            name: name.into(),
            loader,
        }
    }

    /// Module name (also the global it is bound to)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module's open function
    pub fn loader(&self) -> lua_CFunction {
        self.loader
    }
}

impl fmt::Debug for LoadLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadLib").field("name", &self.name).finish()
    }
}

/// The standard libraries, in the order the reference interpreter opens
/// them.
pub fn standard_libs() -> Vec<LoadLib> {
    vec![
        LoadLib::new("_G", luaopen_base),
        LoadLib::new("package", luaopen_package),
        LoadLib::new("coroutine", luaopen_coroutine),
        LoadLib::new("table", luaopen_table),
        LoadLib::new("io", luaopen_io),
        LoadLib::new("os", luaopen_os),
        LoadLib::new("string", luaopen_string),
        LoadLib::new("math", luaopen_math),
        LoadLib::new("utf8", luaopen_utf8),
        LoadLib::new("debug", luaopen_debug),
    ]
}

/// Look up a standard library by name. `"base"` is accepted for `_G`.
pub fn lib_by_name(name: &str) -> Option<LoadLib> {
    let name = if name == "base" { "_G" } else { name };
    standard_libs().into_iter().find(|lib| lib.name() == name)
}
