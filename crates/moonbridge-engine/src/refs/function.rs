//! Function handles

use std::ops::Deref;

use crate::convert::{IntoLua, IntoLuaArgs};
use crate::error::LuaResult;
use crate::refs::LuaRef;

/// Handle to a Lua function.
///
/// A failed load yields a nil function; calling it fails like calling any
/// nil value.
#[derive(Clone, PartialEq, Debug)]
pub struct LuaFunction<'lua>(LuaRef<'lua>);

impl<'lua> LuaFunction<'lua> {
    pub(crate) fn wrap(reference: LuaRef<'lua>) -> Self {
        LuaFunction(reference)
    }

    /// Call in protected mode and capture every result.
    ///
    /// A runtime error is reported to the error handler and returned as
    /// `LuaError::Runtime`.
    pub fn call<A: IntoLuaArgs>(&self, args: A) -> LuaResult<Vec<LuaRef<'lua>>> {
        let state = self.0.state();
        let _guard = state.stack_guard();
        IntoLua::push(&self.0, state)?;
        let nargs = args.push_args(state)?;
        state.call_pushed(nargs)
    }
}

impl<'lua> Deref for LuaFunction<'lua> {
    type Target = LuaRef<'lua>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'lua> AsRef<LuaRef<'lua>> for LuaFunction<'lua> {
    fn as_ref(&self) -> &LuaRef<'lua> {
        &self.0
    }
}

impl<'lua> From<LuaFunction<'lua>> for LuaRef<'lua> {
    fn from(function: LuaFunction<'lua>) -> Self {
        function.0
    }
}

#[cfg(test)]
mod tests {
    use crate::{LuaError, LuaState, Status};

    #[test]
    fn test_multiple_and_zero_results() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let swap = state.load_string("local a, b = ... return b, a");
        let out = swap.call((1i64, "two")).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get::<String>().unwrap(), "two");
        assert_eq!(out[1].get::<i64>().unwrap(), 1);

        let nothing = state.load_string("local x = 1");
        assert!(nothing.call(()).unwrap().is_empty());
        assert_eq!(state.stack_top(), 0);
    }

    #[test]
    fn test_runtime_error_is_reported() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.set_error_handler(move |status, msg| sink.lock().push((status, msg.to_string())));

        let boom = state.load_string("error('boom')");
        let err = boom.call(()).unwrap_err();
        assert!(matches!(err, LuaError::Runtime(Status::RuntimeError)));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1.contains("boom"));
        assert_eq!(state.stack_top(), 0);
    }

    #[test]
    fn test_nil_function_call_fails() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        state.set_error_handler(|_, _| {});
        let broken = state.load_string("this is not lua");
        assert!(broken.is_nil());
        assert!(broken.call(()).is_err());
        assert_eq!(state.stack_top(), 0);
    }
}
