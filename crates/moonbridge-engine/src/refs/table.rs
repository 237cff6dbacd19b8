//! Table handles

use std::ops::Deref;

use mlua_sys::{
    lua_getmetatable, lua_next, lua_pushcfunction, lua_pushnil, lua_rawget, lua_rawlen,
    lua_rawset, lua_setmetatable, lua_tonumber, lua_type, LUA_TNIL, LUA_TNUMBER,
};

use crate::convert::{is_integer, FromLua, IntoLua, IntoLuaArgs};
use crate::error::{LuaError, LuaResult};
use crate::protect::{protected_get, protected_set};
use crate::refs::{LuaFunction, LuaRef};
use crate::state::LuaState;

/// Handle to a Lua table.
#[derive(Clone, PartialEq, Debug)]
pub struct LuaTable<'lua>(LuaRef<'lua>);

impl<'lua> LuaTable<'lua> {
    pub(crate) fn wrap(reference: LuaRef<'lua>) -> Self {
        LuaTable(reference)
    }

    fn state(&self) -> &'lua LuaState {
        self.0.state()
    }

    /// `table[key]`, honouring `__index`. Errors raised by metamethods are
    /// reported to the error handler.
    pub fn get<K: IntoLua, V: FromLua<'lua>>(&self, key: K) -> LuaResult<V> {
        let state = self.state();
        let _guard = state.stack_guard();
        state.reserve(3)?;
        unsafe { lua_pushcfunction(state.as_ptr(), protected_get) };
        IntoLua::push(&self.0, state)?;
        key.push(state)?;
        let first = state.protected_call(2, 1)?;
        V::from_lua(state, first)
    }

    /// `table[key] = value`, honouring `__newindex`.
    pub fn set<K: IntoLua, V: IntoLua>(&self, key: K, value: V) -> LuaResult<()> {
        let state = self.state();
        let _guard = state.stack_guard();
        state.reserve(4)?;
        unsafe { lua_pushcfunction(state.as_ptr(), protected_set) };
        IntoLua::push(&self.0, state)?;
        key.push(state)?;
        value.push(state)?;
        state.protected_call(3, 0)?;
        Ok(())
    }

    /// `table[key]` without metamethods.
    pub fn raw_get<K: IntoLua, V: FromLua<'lua>>(&self, key: K) -> LuaResult<V> {
        let state = self.state();
        let _guard = state.stack_guard();
        state.reserve(2)?;
        IntoLua::push(&self.0, state)?;
        key.push(state)?;
        unsafe { lua_rawget(state.as_ptr(), -2) };
        V::from_lua(state, -1)
    }

    /// `table[key] = value` without metamethods. Nil and NaN keys are
    /// rejected instead of raising inside the VM.
    pub fn raw_set<K: IntoLua, V: IntoLua>(&self, key: K, value: V) -> LuaResult<()> {
        let state = self.state();
        let _guard = state.stack_guard();
        state.reserve(3)?;
        IntoLua::push(&self.0, state)?;
        key.push(state)?;
        check_key(state)?;
        value.push(state)?;
        unsafe { lua_rawset(state.as_ptr(), -3) };
        Ok(())
    }

    /// Border of the array part (`#t` without `__len`)
    pub fn raw_len(&self) -> usize {
        let state = self.state();
        let _guard = state.stack_guard();
        if state.reserve(1).is_err() {
            return 0;
        }
        unsafe {
            self.0.push_raw(state.as_ptr());
            lua_rawlen(state.as_ptr(), -1)
        }
    }

    /// Snapshot of every key/value pair, in `next` order.
    pub fn pairs(&self) -> LuaResult<Vec<(LuaRef<'lua>, LuaRef<'lua>)>> {
        let state = self.state();
        let l = state.as_ptr();
        let _guard = state.stack_guard();
        state.reserve(4)?;
        let mut entries = Vec::new();
        unsafe {
            self.0.push_raw(l);
            lua_pushnil(l);
            while lua_next(l, -2) != 0 {
                let value = LuaRef::pop_from(state);
                // Keep the key in place for the next iteration
                mlua_sys::lua_pushvalue(l, -1);
                let key = LuaRef::pop_from(state);
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    /// The table's metatable, if any.
    pub fn metatable(&self) -> LuaResult<Option<LuaTable<'lua>>> {
        let state = self.state();
        let _guard = state.stack_guard();
        state.reserve(2)?;
        unsafe {
            self.0.push_raw(state.as_ptr());
            if lua_getmetatable(state.as_ptr(), -1) == 0 {
                return Ok(None);
            }
            Ok(Some(LuaTable(LuaRef::pop_from(state))))
        }
    }

    /// Replace (or with `None`, remove) the metatable.
    pub fn set_metatable(&self, metatable: Option<&LuaTable<'_>>) -> LuaResult<()> {
        let state = self.state();
        let _guard = state.stack_guard();
        state.reserve(2)?;
        IntoLua::push(&self.0, state)?;
        match metatable {
            Some(mt) => mt.push(state)?,
            None => unsafe { lua_pushnil(state.as_ptr()) },
        }
        unsafe { lua_setmetatable(state.as_ptr(), -2) };
        Ok(())
    }

    /// Proxy for `table[key]`.
    pub fn entry<K: IntoLua>(&self, key: K) -> TableKey<'lua, K> {
        TableKey {
            table: self.clone(),
            key,
        }
    }
}

/// Fails with `InvalidKey` when the value on top of the stack cannot be a
/// table key.
fn check_key(state: &LuaState) -> LuaResult<()> {
    let l = state.as_ptr();
    unsafe {
        match lua_type(l, -1) {
            LUA_TNIL => Err(LuaError::InvalidKey("nil")),
            LUA_TNUMBER if !is_integer(state, -1) && lua_tonumber(l, -1).is_nan() => {
                Err(LuaError::InvalidKey("NaN"))
            }
            _ => Ok(()),
        }
    }
}

impl<'lua> Deref for LuaTable<'lua> {
    type Target = LuaRef<'lua>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'lua> AsRef<LuaRef<'lua>> for LuaTable<'lua> {
    fn as_ref(&self) -> &LuaRef<'lua> {
        &self.0
    }
}

impl<'lua> From<LuaTable<'lua>> for LuaRef<'lua> {
    fn from(table: LuaTable<'lua>) -> Self {
        table.0
    }
}

/// Gettable/settable reference to `table[key]`.
///
/// Returned by [`LuaState::global`] for the global namespace and by
/// [`LuaTable::entry`].
pub struct TableKey<'lua, K> {
    table: LuaTable<'lua>,
    key: K,
}

impl<'lua, K: IntoLua> TableKey<'lua, K> {
    pub(crate) fn new(table: LuaTable<'lua>, key: K) -> Self {
        Self { table, key }
    }

    /// Read and convert the current value.
    pub fn get<V: FromLua<'lua>>(&self) -> LuaResult<V> {
        self.table.get(&self.key)
    }

    /// Capture the current value as a handle.
    pub fn get_ref(&self) -> LuaResult<LuaRef<'lua>> {
        self.get()
    }

    pub fn set<V: IntoLua>(&self, value: V) -> LuaResult<()> {
        self.table.set(&self.key, value)
    }

    /// True when the slot is empty (or could not be read).
    pub fn is_nil(&self) -> bool {
        self.get_ref().map(|r| r.is_nil()).unwrap_or(true)
    }

    /// Call the function stored in the slot.
    pub fn call<A: IntoLuaArgs>(&self, args: A) -> LuaResult<Vec<LuaRef<'lua>>> {
        let function: LuaFunction<'lua> = self.get_ref()?.into_function()?;
        function.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_roundtrip_through_metamethods() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let table = state.new_table().unwrap();
        table.set("x", 10i64).unwrap();
        assert_eq!(table.get::<_, i64>("x").unwrap(), 10);
        assert_eq!(table.raw_get::<_, i64>("x").unwrap(), 10);
        assert_eq!(state.stack_top(), 0);
    }

    #[test]
    fn test_raw_set_rejects_bad_keys() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let table = state.new_table().unwrap();
        assert!(matches!(
            table.raw_set(crate::Nil, 1i64),
            Err(LuaError::InvalidKey("nil"))
        ));
        assert!(matches!(
            table.raw_set(f64::NAN, 1i64),
            Err(LuaError::InvalidKey("NaN"))
        ));
        assert_eq!(state.stack_top(), 0);
    }

    #[test]
    fn test_set_nil_key_reports_error() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        state.set_error_handler(move |_, _| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let table = state.new_table().unwrap();
        assert!(matches!(
            table.set(crate::Nil, 1i64),
            Err(LuaError::Runtime(moonbridge_sdk::Status::RuntimeError))
        ));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(state.stack_top(), 0);
    }

    #[test]
    fn test_len_and_pairs() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let table = state.new_table().unwrap();
        for i in 1..=3i64 {
            table.raw_set(i, i * 10).unwrap();
        }
        assert_eq!(table.raw_len(), 3);
        let mut sum = 0;
        for (key, value) in table.pairs().unwrap() {
            assert_eq!(key.get::<i64>().unwrap() * 10, value.get::<i64>().unwrap());
            sum += value.get::<i64>().unwrap();
        }
        assert_eq!(sum, 60);
        assert_eq!(state.stack_top(), 0);
    }

    #[test]
    fn test_metatable_index() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let table = state.new_table().unwrap();
        let fallback = state.new_table().unwrap();
        fallback.set("greeting", "hello").unwrap();
        let mt = state.new_table().unwrap();
        mt.set("__index", &fallback).unwrap();

        assert!(table.metatable().unwrap().is_none());
        table.set_metatable(Some(&mt)).unwrap();
        assert_eq!(table.metatable().unwrap().unwrap(), mt);
        assert_eq!(table.get::<_, String>("greeting").unwrap(), "hello");
        assert!(table.raw_get::<_, Option<String>>("greeting").unwrap().is_none());

        table.set_metatable(None).unwrap();
        assert!(table.metatable().unwrap().is_none());
    }

    #[test]
    fn test_entry_proxy() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let table = state.new_table().unwrap();
        let slot = table.entry("name");
        assert!(slot.is_nil());
        slot.set("moon").unwrap();
        assert_eq!(slot.get::<String>().unwrap(), "moon");
    }
}
