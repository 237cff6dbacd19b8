//! VM instance
//!
//! [`LuaState`] owns (or borrows) one Lua VM and is the entry point for
//! everything else: library loading, the load/execute protocol, global
//! access, handle factories and collector control.
//!
//! # Load/execute protocol
//!
//! Every execute entry point is `Load -> BindEnvironment? -> Invoke`:
//!
//! 1. the source is compiled into a function; a syntax error stops here,
//! 2. with an environment table, that table replaces the chunk's `_ENV`
//!    upvalue, so the chunk resolves globals against it instead of the
//!    global table,
//! 3. the function runs in protected mode.
//!
//! A failing stage is reported once to the VM's error handler with the
//! VM status and message; the caller only sees `false` (or an `Err`
//! carrying the status). The whole sequence runs under a stack guard, so
//! the operand stack is balanced afterwards regardless of which stage
//! failed.

use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::os::raw::c_int;
use std::path::Path;
use std::sync::Arc;

use mlua_sys::{
    lua_Integer, lua_State, lua_atpanic, lua_checkstack, lua_close, lua_createtable, lua_gettop,
    lua_insert, lua_newthread, lua_pcall, lua_pop, lua_pushcfunction, lua_pushinteger,
    lua_pushvalue, lua_rawgeti, lua_setupvalue, lua_settop, luaL_loadbufferx, luaL_loadfilex,
    luaL_newstate, LUA_MULTRET, LUA_OK, LUA_REGISTRYINDEX, LUA_RIDX_GLOBALS,
};
use moonbridge_sdk::{HostAllocator, Status};
use tracing::{debug, trace, warn};

use crate::alloc::new_state_with;
use crate::convert::{FromLua, IntoLua};
use crate::defaults::{ANY_CHUNK, CALL_STACK_SLACK, DEFAULT_CHUNK_NAME, TEXT_ONLY};
use crate::error::{LuaError, LuaResult};
use crate::error_handler::{default_handler, main_thread, ErrorHandlerFn, ErrorHandlerRegistry};
use crate::gc::Gc;
use crate::libs::{standard_libs, LoadLib};
use crate::options::{GcMode, GcSettings, StateOptions};
use crate::protect::{default_panic, protected_new_table, protected_require, traceback_handler};
use crate::refs::{LuaFunction, LuaRef, LuaTable, LuaThread, TableKey};
use crate::stack::StackGuard;

/// Source handed to the loader
enum Chunk<'a> {
    Source { text: &'a str, name: Option<&'a str> },
    File(&'a Path),
}

/// One Lua VM.
///
/// Not thread-safe: the operand stack is a single mutable resource, so
/// neither the state nor its handles are `Send` or `Sync`.
pub struct LuaState {
    l: *mut lua_State,
    main: *mut lua_State,
    owned: bool,
    traceback: Cell<bool>,
    // Dropped after lua_close, which still frees through it
    _allocator: Option<Arc<dyn HostAllocator>>,
}

impl LuaState {
    /// New state with the standard libraries, using the C allocator.
    pub fn new() -> LuaResult<Self> {
        Self::with_options(StateOptions::default())
    }

    /// New state opening exactly `libs`, in order.
    pub fn with_libs(libs: Vec<LoadLib>) -> LuaResult<Self> {
        Self::with_options(StateOptions {
            libraries: crate::options::Libraries::Custom(libs),
            ..StateOptions::default()
        })
    }

    /// New state using the C allocator.
    pub fn with_options(options: StateOptions) -> LuaResult<Self> {
        let l = unsafe { luaL_newstate() };
        Self::init(l, None, options)
    }

    /// New state with the standard libraries whose memory is served by
    /// `allocator`.
    pub fn with_allocator<A: HostAllocator>(allocator: Arc<A>) -> LuaResult<Self> {
        Self::with_options_and_allocator(StateOptions::default(), allocator)
    }

    /// New state whose memory is served by `allocator`. The state keeps a
    /// share of the allocator until after the VM is closed.
    pub fn with_options_and_allocator<A: HostAllocator>(
        options: StateOptions,
        allocator: Arc<A>,
    ) -> LuaResult<Self> {
        let l = new_state_with(&allocator);
        let allocator: Arc<dyn HostAllocator> = allocator;
        Self::init(l, Some(allocator), options)
    }

    /// Wrap a VM owned by someone else. The VM is never closed by the
    /// wrapper and its error handler entry is left alone.
    ///
    /// # Safety
    /// `state` must be a valid Lua state that stays open for as long as the
    /// wrapper and every handle obtained through it are alive. Using a
    /// handle after the VM has been closed is undefined behavior.
    pub unsafe fn from_raw(state: *mut lua_State) -> Self {
        let main = {
            let _guard = StackGuard::from_raw(state);
            main_thread(state)
        };
        LuaState {
            l: state,
            main,
            owned: false,
            traceback: Cell::new(false),
            _allocator: None,
        }
    }

    fn init(
        l: *mut lua_State,
        allocator: Option<Arc<dyn HostAllocator>>,
        options: StateOptions,
    ) -> LuaResult<Self> {
        if l.is_null() {
            warn!("lua state allocation failed");
            return Err(LuaError::StateCreation);
        }
        // Owned from here on: an early return closes the VM
        let state = LuaState {
            l,
            main: l,
            owned: true,
            traceback: Cell::new(options.traceback),
            _allocator: allocator,
        };
        unsafe { lua_atpanic(l, default_panic) };

        let handler: ErrorHandlerFn = options
            .error_handler
            .clone()
            .unwrap_or_else(|| Arc::new(default_handler));
        unsafe { ErrorHandlerRegistry::global().register(l, handler) };

        state.apply_gc(&options.gc);
        state.open_libs_from(&options.libraries.resolve())?;
        debug!(
            custom_allocator = state._allocator.is_some(),
            traceback = options.traceback,
            "lua state created"
        );
        Ok(state)
    }

    fn apply_gc(&self, settings: &GcSettings) {
        let gc = self.gc();
        gc.set_pause(settings.pause);
        gc.set_step_mul(settings.step_mul);
        if settings.mode == GcMode::Generational {
            gc.generational(0, 0);
        }
    }

    // ===== Identity =====

    /// Raw VM handle
    pub fn as_ptr(&self) -> *mut lua_State {
        self.l
    }

    /// Main thread of the VM (the error handler registry key)
    pub fn main_ptr(&self) -> *mut lua_State {
        self.main
    }

    /// Whether dropping this wrapper closes the VM
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub(crate) fn same_vm(&self, other: &LuaState) -> bool {
        self.main == other.main
    }

    // ===== Error reporting =====

    /// Replace this VM's error handler.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(Status, &str) + Send + Sync + 'static,
    {
        unsafe { ErrorHandlerRegistry::global().register(self.l, Arc::new(handler)) };
    }

    /// Append a stack traceback to runtime error messages.
    pub fn set_traceback(&self, enabled: bool) {
        self.traceback.set(enabled);
    }

    // ===== Libraries =====

    /// Open every standard library.
    pub fn open_libs(&self) -> LuaResult<()> {
        self.open_libs_from(&standard_libs())
    }

    /// Open `libs` in order, stopping at the first failure.
    pub fn open_libs_from(&self, libs: &[LoadLib]) -> LuaResult<()> {
        libs.iter().try_for_each(|lib| self.open_lib(lib))
    }

    /// Open one library and bind it as a global.
    pub fn open_lib(&self, lib: &LoadLib) -> LuaResult<()> {
        let _guard = self.stack_guard();
        self.reserve(3)?;
        unsafe { lua_pushcfunction(self.l, protected_require) };
        lib.name().push(self)?;
        unsafe { lua_pushcfunction(self.l, lib.loader()) };
        self.protected_call(2, 0)?;
        trace!(library = lib.name(), "opened library");
        Ok(())
    }

    // ===== Load / execute =====

    /// Compile `source`. The chunk is named after its own text. Returns a
    /// nil function when compilation fails.
    pub fn load_string(&self, source: &str) -> LuaFunction<'_> {
        self.load(Chunk::Source {
            text: source,
            name: None,
        })
    }

    /// Compile `source` under `name`, used verbatim as the chunk name
    /// (`=name` and `@file` follow Lua's conventions).
    pub fn load_string_named(&self, source: &str, name: &str) -> LuaFunction<'_> {
        self.load(Chunk::Source {
            text: source,
            name: Some(name),
        })
    }

    /// Compile the file at `path`. Returns a nil function on failure.
    pub fn load_file(&self, path: impl AsRef<Path>) -> LuaFunction<'_> {
        self.load(Chunk::File(path.as_ref()))
    }

    /// Run `source`; false when it failed to compile or raised an error.
    pub fn do_string(&self, source: &str) -> bool {
        self.execute(Self::source(source), None).is_ok()
    }

    /// Run `source` with `env` as its global environment.
    pub fn do_string_in(&self, source: &str, env: &LuaTable<'_>) -> bool {
        self.execute(Self::source(source), Some(env)).is_ok()
    }

    /// Run the file at `path`.
    pub fn do_file(&self, path: impl AsRef<Path>) -> bool {
        self.execute(Chunk::File(path.as_ref()), None).is_ok()
    }

    /// Run the file at `path` with `env` as its global environment.
    pub fn do_file_in(&self, path: impl AsRef<Path>, env: &LuaTable<'_>) -> bool {
        self.execute(Chunk::File(path.as_ref()), Some(env)).is_ok()
    }

    /// Run `source` and capture everything it returns.
    pub fn eval(&self, source: &str) -> LuaResult<Vec<LuaRef<'_>>> {
        self.execute(Self::source(source), None)
    }

    /// Run `source` against `env` and capture everything it returns.
    pub fn eval_in(&self, source: &str, env: &LuaTable<'_>) -> LuaResult<Vec<LuaRef<'_>>> {
        self.execute(Self::source(source), Some(env))
    }

    fn source(text: &str) -> Chunk<'_> {
        Chunk::Source { text, name: None }
    }

    fn load(&self, chunk: Chunk<'_>) -> LuaFunction<'_> {
        let _guard = self.stack_guard();
        match self.load_chunk(chunk, ANY_CHUNK) {
            Ok(()) => LuaFunction::wrap(unsafe { LuaRef::pop_from(self) }),
            Err(_) => LuaFunction::wrap(LuaRef::nil(self)),
        }
    }

    fn execute(&self, chunk: Chunk<'_>, env: Option<&LuaTable<'_>>) -> LuaResult<Vec<LuaRef<'_>>> {
        let _guard = self.stack_guard();
        // Precompiled chunks bypass the environment's restrictions
        let mode = if env.is_some() { TEXT_ONLY } else { ANY_CHUNK };
        self.load_chunk(chunk, mode)?;
        if let Some(env) = env {
            self.bind_env(env)?;
        }
        self.call_pushed(0)
    }

    /// Compile a chunk, leaving the function on top of the stack. Failures
    /// are reported and leave the message on the stack. `mode` is Lua's
    /// `"t"` / `"b"` / `"bt"` chunk mode.
    fn load_chunk(&self, chunk: Chunk<'_>, mode: &CStr) -> LuaResult<()> {
        self.reserve(1)?;
        let status = match chunk {
            Chunk::Source { text, name } => {
                let name = CString::new(name.unwrap_or(text))
                    .unwrap_or_else(|_| DEFAULT_CHUNK_NAME.to_owned());
                unsafe {
                    luaL_loadbufferx(
                        self.l,
                        text.as_ptr().cast(),
                        text.len(),
                        name.as_ptr(),
                        mode.as_ptr(),
                    )
                }
            }
            Chunk::File(path) => {
                let Ok(cpath) = CString::new(path.as_os_str().as_encoded_bytes()) else {
                    let message = format!("cannot open {} (path contains a nul byte)", path.display());
                    ErrorHandlerRegistry::global().report(self.main, Status::FileError, &message);
                    return Err(LuaError::Load(Status::FileError));
                };
                unsafe { luaL_loadfilex(self.l, cpath.as_ptr(), mode.as_ptr()) }
            }
        };
        if status != LUA_OK {
            let status_code = status;
            let status = Status::from_code(status);
            debug!(%status, "chunk failed to load");
            unsafe { ErrorHandlerRegistry::global().handle(status_code, self.l) };
            return Err(LuaError::Load(status));
        }
        Ok(())
    }

    /// Replace the `_ENV` upvalue of the function on top of the stack.
    fn bind_env(&self, env: &LuaTable<'_>) -> LuaResult<()> {
        env.push(self)?;
        unsafe {
            if lua_setupvalue(self.l, -2, 1).is_null() {
                // No upvalue to replace; the table was not consumed
                lua_pop(self.l, 1);
            }
        }
        Ok(())
    }

    /// Protected call of the function sitting below `nargs` arguments.
    ///
    /// On success returns the index of the first result; everything from
    /// the function's old slot up is the caller's (guarded) to clean. On
    /// failure the error is reported and the message left on the stack.
    pub(crate) fn protected_call(&self, nargs: c_int, nresults: c_int) -> LuaResult<c_int> {
        self.reserve(CALL_STACK_SLACK)?;
        let l = self.l;
        unsafe {
            let func = lua_gettop(l) - nargs;
            let mut msgh = 0;
            if self.traceback.get() {
                lua_pushcfunction(l, traceback_handler);
                lua_insert(l, func);
                msgh = func;
            }
            let status = lua_pcall(l, nargs, nresults, msgh);
            if status != LUA_OK {
                let code = status;
                let status = Status::from_code(status);
                debug!(%status, "protected call failed");
                ErrorHandlerRegistry::global().handle(code, l);
                return Err(LuaError::Runtime(status));
            }
            Ok(if msgh != 0 { func + 1 } else { func })
        }
    }

    /// Call the function below `nargs` arguments and capture all results.
    pub(crate) fn call_pushed(&self, nargs: c_int) -> LuaResult<Vec<LuaRef<'_>>> {
        let first = self.protected_call(nargs, LUA_MULTRET)?;
        let count = unsafe { lua_gettop(self.l) } - first + 1;
        self.capture_top(count)
    }

    /// Capture the top `n` values, in stack order, and pop them.
    pub(crate) fn capture_top(&self, n: c_int) -> LuaResult<Vec<LuaRef<'_>>> {
        self.reserve(1)?;
        let l = self.l;
        unsafe {
            let top = lua_gettop(l);
            let base = top - n;
            let mut values = Vec::with_capacity(n.max(0) as usize);
            for idx in base + 1..=top {
                lua_pushvalue(l, idx);
                values.push(LuaRef::pop_from(self));
            }
            lua_settop(l, base);
            Ok(values)
        }
    }

    // ===== Globals =====

    /// The global table
    pub fn globals(&self) -> LuaResult<LuaTable<'_>> {
        self.reserve(1)?;
        unsafe {
            lua_rawgeti(self.l, LUA_REGISTRYINDEX, LUA_RIDX_GLOBALS);
            Ok(LuaTable::wrap(LuaRef::pop_from(self)))
        }
    }

    /// Gettable/settable proxy for the global `name`.
    pub fn global(&self, name: &str) -> LuaResult<TableKey<'_, String>> {
        Ok(TableKey::new(self.globals()?, name.to_string()))
    }

    // ===== Factories =====

    /// Capture `value` in a new handle.
    pub fn new_ref<T: IntoLua>(&self, value: T) -> LuaResult<LuaRef<'_>> {
        let _guard = self.stack_guard();
        value.push(self)?;
        Ok(unsafe { LuaRef::pop_from(self) })
    }

    pub fn new_table(&self) -> LuaResult<LuaTable<'_>> {
        self.new_table_with(0, 0)
    }

    /// New table with preallocated array and hash parts. Sizes are hints;
    /// a request the VM cannot satisfy is reported like any runtime error.
    pub fn new_table_with(&self, narr: usize, nrec: usize) -> LuaResult<LuaTable<'_>> {
        if narr == 0 && nrec == 0 {
            self.reserve(1)?;
            return unsafe {
                lua_createtable(self.l, 0, 0);
                Ok(LuaTable::wrap(LuaRef::pop_from(self)))
            };
        }
        let _guard = self.stack_guard();
        self.reserve(3)?;
        unsafe {
            lua_pushcfunction(self.l, protected_new_table);
            lua_pushinteger(self.l, lua_Integer::try_from(narr).unwrap_or(lua_Integer::MAX));
            lua_pushinteger(self.l, lua_Integer::try_from(nrec).unwrap_or(lua_Integer::MAX));
        }
        let first = self.protected_call(2, 1)?;
        LuaTable::from_lua(self, first)
    }

    /// New table that is also left on top of the stack, for `luaopen_*`
    /// style module loaders returning it.
    pub fn new_lib(&self) -> LuaResult<LuaTable<'_>> {
        self.reserve(2)?;
        unsafe {
            lua_createtable(self.l, 0, 0);
            lua_pushvalue(self.l, -1);
            Ok(LuaTable::wrap(LuaRef::pop_from(self)))
        }
    }

    /// New coroutine with no body. See [`LuaThread::set_function`].
    pub fn new_thread(&self) -> LuaResult<LuaThread<'_>> {
        self.reserve(1)?;
        unsafe {
            lua_newthread(self.l);
            Ok(LuaThread::wrap(LuaRef::pop_from(self)))
        }
    }

    /// New coroutine that runs `function` when first resumed.
    pub fn new_thread_with(&self, function: &LuaFunction<'_>) -> LuaResult<LuaThread<'_>> {
        let thread = self.new_thread()?;
        thread.set_function(function)?;
        Ok(thread)
    }

    // ===== Stack =====

    /// Push `value`, leaving it on the stack.
    pub fn push<T: IntoLua>(&self, value: T) -> LuaResult<()> {
        value.push(self)
    }

    /// Capture and pop the top value; nil when the stack is empty.
    pub fn pop_ref(&self) -> LuaRef<'_> {
        if self.stack_top() == 0 {
            return LuaRef::nil(self);
        }
        unsafe { LuaRef::pop_from(self) }
    }

    /// Current operand stack height
    pub fn stack_top(&self) -> c_int {
        unsafe { lua_gettop(self.l) }
    }

    /// Open a guard restoring the current stack height on drop.
    pub fn stack_guard(&self) -> StackGuard<'_> {
        StackGuard::new(self)
    }

    /// Make room for `n` more values.
    pub(crate) fn reserve(&self, n: c_int) -> LuaResult<()> {
        if unsafe { lua_checkstack(self.l, n) } == 0 {
            return Err(LuaError::StackOverflow(n));
        }
        Ok(())
    }

    // ===== Collector =====

    pub fn gc(&self) -> Gc<'_> {
        Gc::new(self)
    }

    /// Full collection cycle
    pub fn garbage_collect(&self) {
        self.gc().collect();
    }

    /// Memory in use, in kilobytes
    pub fn used_kbytes(&self) -> usize {
        self.gc().count()
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        ErrorHandlerRegistry::global().remove_main(self.main);
        unsafe { lua_close(self.l) };
        debug!("lua state closed");
    }
}
