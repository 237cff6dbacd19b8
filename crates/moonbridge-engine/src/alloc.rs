//! Allocator adapter
//!
//! Bridges a [`HostAllocator`] to Lua's `lua_Alloc` callback. The callback
//! is monomorphized per allocator type and receives a pointer to the
//! allocator as its userdata; the owning `LuaState` holds a shared
//! reference so the allocator outlives every call the VM makes, including
//! those issued while the VM tears itself down.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use mlua_sys::{lua_State, lua_newstate};
use moonbridge_sdk::HostAllocator;

/// `lua_Alloc` implementation for allocator type `A`.
///
/// Policy: `nsize == 0` frees and returns null, a null `ptr` allocates,
/// anything else reallocates. A panicking allocator is treated as an
/// exhausted one.
pub(crate) unsafe extern "C-unwind" fn allocator_callback<A: HostAllocator>(
    ud: *mut c_void,
    ptr: *mut c_void,
    osize: usize,
    nsize: usize,
) -> *mut c_void {
    let allocator = &*(ud as *const A);
    catch_unwind(AssertUnwindSafe(|| {
        if nsize == 0 {
            if !ptr.is_null() {
                allocator.deallocate(ptr, osize);
            }
            ptr::null_mut()
        } else if ptr.is_null() {
            // osize carries the object kind here, not a size
            allocator.allocate(nsize)
        } else {
            allocator.reallocate(ptr, osize, nsize)
        }
    }))
    .unwrap_or(ptr::null_mut())
}

/// Create a Lua state whose memory is served by `allocator`.
///
/// Returns null when the VM could not allocate its main thread. The caller
/// must keep `allocator` alive until after `lua_close`.
pub(crate) fn new_state_with<A: HostAllocator>(allocator: &Arc<A>) -> *mut lua_State {
    let ud = Arc::as_ptr(allocator) as *mut c_void;
    unsafe { lua_newstate(allocator_callback::<A>, ud) }
}
