//! Value conversion at the stack boundary
//!
//! Only the conversions the core needs to move arguments in and results
//! out: booleans, integers, floats, strings, nil and reference handles.
//! Richer marshalling is layered on top of [`IntoLua`] and [`FromLua`].

use std::ffi::CStr;
use std::os::raw::c_int;

use mlua_sys::{
    lua_isinteger, lua_pushboolean, lua_pushinteger, lua_pushlstring, lua_pushnil,
    lua_pushnumber, lua_pushvalue, lua_toboolean, lua_tointegerx, lua_tolstring, lua_tonumberx,
    lua_type, lua_typename, LUA_TNIL, LUA_TNONE, LUA_TNUMBER, LUA_TSTRING,
};

use crate::error::{LuaError, LuaResult};
use crate::refs::{LuaFunction, LuaRef, LuaTable, LuaThread};
use crate::state::LuaState;

/// The Lua `nil` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nil;

/// A value that can be pushed onto a state's operand stack.
pub trait IntoLua {
    /// Push exactly one value.
    fn push(&self, state: &LuaState) -> LuaResult<()>;
}

/// A sequence of call arguments.
pub trait IntoLuaArgs {
    /// Push every argument in order; returns how many were pushed.
    fn push_args(&self, state: &LuaState) -> LuaResult<c_int>;
}

/// A value that can be read from a stack slot.
pub trait FromLua<'lua>: Sized {
    /// Read the value at `idx` without removing it.
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self>;
}

/// Lua type name of the value at `idx`
pub(crate) fn type_name_at(state: &LuaState, idx: c_int) -> String {
    unsafe {
        let ty = lua_type(state.as_ptr(), idx);
        CStr::from_ptr(lua_typename(state.as_ptr(), ty))
            .to_string_lossy()
            .into_owned()
    }
}

pub(crate) fn mismatch(state: &LuaState, idx: c_int, expected: &'static str) -> LuaError {
    LuaError::TypeMismatch {
        expected,
        got: type_name_at(state, idx),
    }
}

// ===== IntoLua =====

impl IntoLua for Nil {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        state.reserve(1)?;
        unsafe { lua_pushnil(state.as_ptr()) };
        Ok(())
    }
}

impl IntoLua for bool {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        state.reserve(1)?;
        unsafe { lua_pushboolean(state.as_ptr(), *self as c_int) };
        Ok(())
    }
}

impl IntoLua for i64 {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        state.reserve(1)?;
        unsafe { lua_pushinteger(state.as_ptr(), *self) };
        Ok(())
    }
}

impl IntoLua for i32 {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        i64::from(*self).push(state)
    }
}

impl IntoLua for usize {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        match i64::try_from(*self) {
            Ok(n) => n.push(state),
            Err(_) => (*self as f64).push(state),
        }
    }
}

impl IntoLua for f64 {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        state.reserve(1)?;
        unsafe { lua_pushnumber(state.as_ptr(), *self) };
        Ok(())
    }
}

impl IntoLua for str {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        state.reserve(1)?;
        unsafe { lua_pushlstring(state.as_ptr(), self.as_ptr().cast(), self.len()) };
        Ok(())
    }
}

impl IntoLua for String {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        self.as_str().push(state)
    }
}

impl<T: IntoLua> IntoLua for Option<T> {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        match self {
            Some(value) => value.push(state),
            None => Nil.push(state),
        }
    }
}

impl<T: IntoLua + ?Sized> IntoLua for &T {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        (**self).push(state)
    }
}

impl IntoLua for LuaRef<'_> {
    fn push(&self, state: &LuaState) -> LuaResult<()> {
        if !state.same_vm(self.state()) {
            return Err(LuaError::StateMismatch);
        }
        state.reserve(1)?;
        unsafe { self.push_raw(state.as_ptr()) };
        Ok(())
    }
}

macro_rules! into_lua_via_ref {
    ($($ty:ident),*) => {
        $(
            impl IntoLua for $ty<'_> {
                fn push(&self, state: &LuaState) -> LuaResult<()> {
                    IntoLua::push(self.as_ref(), state)
                }
            }
        )*
    };
}

into_lua_via_ref!(LuaTable, LuaFunction, LuaThread);

// ===== IntoLuaArgs =====

impl IntoLuaArgs for () {
    fn push_args(&self, _state: &LuaState) -> LuaResult<c_int> {
        Ok(0)
    }
}

impl<T: IntoLua> IntoLuaArgs for T {
    fn push_args(&self, state: &LuaState) -> LuaResult<c_int> {
        self.push(state)?;
        Ok(1)
    }
}

impl<T: IntoLua> IntoLuaArgs for Vec<T> {
    fn push_args(&self, state: &LuaState) -> LuaResult<c_int> {
        for arg in self {
            arg.push(state)?;
        }
        Ok(self.len() as c_int)
    }
}

macro_rules! args_tuple {
    ($count:expr; $($name:ident),+) => {
        impl<$($name: IntoLua),+> IntoLuaArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn push_args(&self, state: &LuaState) -> LuaResult<c_int> {
                let ($($name,)+) = self;
                $($name.push(state)?;)+
                Ok($count)
            }
        }
    };
}

args_tuple!(1; A);
args_tuple!(2; A, B);
args_tuple!(3; A, B, C);
args_tuple!(4; A, B, C, D);
args_tuple!(5; A, B, C, D, E);

// ===== FromLua =====

impl<'lua> FromLua<'lua> for bool {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        Ok(unsafe { lua_toboolean(state.as_ptr(), idx) } != 0)
    }
}

impl<'lua> FromLua<'lua> for i64 {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        let mut ok = 0;
        let n = unsafe { lua_tointegerx(state.as_ptr(), idx, &mut ok) };
        if ok != 0 {
            Ok(n)
        } else {
            Err(mismatch(state, idx, "integer"))
        }
    }
}

impl<'lua> FromLua<'lua> for i32 {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        let n = i64::from_lua(state, idx)?;
        i32::try_from(n).map_err(|_| LuaError::TypeMismatch {
            expected: "i32",
            got: format!("integer {}", n),
        })
    }
}

impl<'lua> FromLua<'lua> for f64 {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        let mut ok = 0;
        let n = unsafe { lua_tonumberx(state.as_ptr(), idx, &mut ok) };
        if ok != 0 {
            Ok(n)
        } else {
            Err(mismatch(state, idx, "number"))
        }
    }
}

impl<'lua> FromLua<'lua> for String {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        let l = state.as_ptr();
        unsafe {
            match lua_type(l, idx) {
                LUA_TSTRING | LUA_TNUMBER => {
                    state.reserve(1)?;
                    let _guard = state.stack_guard();
                    // Convert a copy; lua_tolstring rewrites numbers in place
                    lua_pushvalue(l, idx);
                    let mut len = 0usize;
                    let ptr = lua_tolstring(l, -1, &mut len);
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
                    Ok(String::from_utf8_lossy(bytes).into_owned())
                }
                _ => Err(mismatch(state, idx, "string")),
            }
        }
    }
}

impl<'lua> FromLua<'lua> for LuaRef<'lua> {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        state.reserve(1)?;
        unsafe {
            lua_pushvalue(state.as_ptr(), idx);
            Ok(LuaRef::pop_from(state))
        }
    }
}

impl<'lua> FromLua<'lua> for LuaTable<'lua> {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        LuaRef::from_lua(state, idx)?.into_table()
    }
}

impl<'lua> FromLua<'lua> for LuaFunction<'lua> {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        LuaRef::from_lua(state, idx)?.into_function()
    }
}

impl<'lua> FromLua<'lua> for LuaThread<'lua> {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        LuaRef::from_lua(state, idx)?.into_thread()
    }
}

impl<'lua, T: FromLua<'lua>> FromLua<'lua> for Option<T> {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        match unsafe { lua_type(state.as_ptr(), idx) } {
            LUA_TNIL | LUA_TNONE => Ok(None),
            _ => T::from_lua(state, idx).map(Some),
        }
    }
}

impl<'lua> FromLua<'lua> for Nil {
    fn from_lua(state: &'lua LuaState, idx: c_int) -> LuaResult<Self> {
        match unsafe { lua_type(state.as_ptr(), idx) } {
            LUA_TNIL | LUA_TNONE => Ok(Nil),
            _ => Err(mismatch(state, idx, "nil")),
        }
    }
}

/// Whether the value at `idx` is an integer-valued number
pub(crate) fn is_integer(state: &LuaState, idx: c_int) -> bool {
    unsafe { lua_isinteger(state.as_ptr(), idx) != 0 }
}
