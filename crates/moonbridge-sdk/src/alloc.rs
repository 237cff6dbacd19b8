//! Host allocators for the embedded VM
//!
//! The VM routes every allocation, reallocation and free through a single C
//! callback. A host that wants to own that memory implements
//! [`HostAllocator`]; the engine adapts it to the callback shape and keeps
//! the allocator alive for the whole life of the VM handle, including the
//! VM's own teardown.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocation capability supplied by the host.
///
/// Implementations signal exhaustion by returning a null pointer; the VM
/// turns that into a memory error.
pub trait HostAllocator: 'static {
    /// Allocate `size` bytes (never zero).
    fn allocate(&self, size: usize) -> *mut c_void;

    /// Resize a block previously returned by this allocator.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator and still be live,
    /// and `old_size` must be the size it was last allocated with.
    unsafe fn reallocate(&self, ptr: *mut c_void, old_size: usize, new_size: usize) -> *mut c_void;

    /// Release a block previously returned by this allocator.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator and not freed yet.
    unsafe fn deallocate(&self, ptr: *mut c_void, size: usize);
}

/// The C runtime heap (`malloc` / `realloc` / `free`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl HostAllocator for SystemAllocator {
    fn allocate(&self, size: usize) -> *mut c_void {
        unsafe { libc::malloc(size) }
    }

    unsafe fn reallocate(&self, ptr: *mut c_void, _old_size: usize, new_size: usize) -> *mut c_void {
        libc::realloc(ptr, new_size)
    }

    unsafe fn deallocate(&self, ptr: *mut c_void, _size: usize) {
        libc::free(ptr)
    }
}

/// Snapshot of a [`TrackingAllocator`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Bytes currently handed out
    pub in_use: usize,
    /// Highest value `in_use` has reached
    pub peak: usize,
    /// Successful allocate/reallocate calls
    pub allocations: usize,
    /// Blocks released
    pub frees: usize,
    /// Requests refused because of the limit or the inner allocator
    pub failures: usize,
}

/// Wraps another allocator, counting usage and optionally enforcing a hard
/// byte limit.
///
/// Once the limit would be exceeded the request fails with a null pointer,
/// which surfaces inside the VM as a memory error.
#[derive(Debug, Default)]
pub struct TrackingAllocator<A: HostAllocator = SystemAllocator> {
    inner: A,
    limit: Option<usize>,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
    frees: AtomicUsize,
    failures: AtomicUsize,
}

impl TrackingAllocator<SystemAllocator> {
    /// Track the system heap without a limit.
    pub fn new() -> Self {
        Self::wrap(SystemAllocator, None)
    }

    /// Track the system heap, refusing to exceed `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self::wrap(SystemAllocator, Some(limit))
    }
}

impl<A: HostAllocator> TrackingAllocator<A> {
    /// Wrap an arbitrary allocator.
    pub fn wrap(inner: A, limit: Option<usize>) -> Self {
        Self {
            inner,
            limit,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Configured byte limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes currently in use.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Current counters.
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            in_use: self.in_use.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn admits(&self, growth: usize) -> bool {
        match self.limit {
            Some(limit) => self.in_use().saturating_add(growth) <= limit,
            None => true,
        }
    }

    fn record_growth(&self, old_size: usize, new_size: usize) {
        let now = if new_size >= old_size {
            self.in_use.fetch_add(new_size - old_size, Ordering::Relaxed) + (new_size - old_size)
        } else {
            self.in_use.fetch_sub(old_size - new_size, Ordering::Relaxed) - (old_size - new_size)
        };
        self.peak.fetch_max(now, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn refuse(&self) -> *mut c_void {
        self.failures.fetch_add(1, Ordering::Relaxed);
        std::ptr::null_mut()
    }
}

impl<A: HostAllocator> HostAllocator for TrackingAllocator<A> {
    fn allocate(&self, size: usize) -> *mut c_void {
        if !self.admits(size) {
            return self.refuse();
        }
        let ptr = self.inner.allocate(size);
        if ptr.is_null() {
            return self.refuse();
        }
        self.record_growth(0, size);
        ptr
    }

    unsafe fn reallocate(&self, ptr: *mut c_void, old_size: usize, new_size: usize) -> *mut c_void {
        if new_size > old_size && !self.admits(new_size - old_size) {
            return self.refuse();
        }
        let new_ptr = self.inner.reallocate(ptr, old_size, new_size);
        if new_ptr.is_null() {
            return self.refuse();
        }
        self.record_growth(old_size, new_size);
        new_ptr
    }

    unsafe fn deallocate(&self, ptr: *mut c_void, size: usize) {
        self.inner.deallocate(ptr, size);
        self.in_use.fetch_sub(size, Ordering::Relaxed);
        self.frees.fetch_add(1, Ordering::Relaxed);
    }
}
