//! Moonbridge SDK - host-facing types for embedding Lua
//!
//! This crate holds the small set of types a host program implements or
//! inspects without touching the Lua C API directly:
//!
//! - [`HostAllocator`]: the capability a host supplies to own every byte the
//!   VM allocates
//! - [`SystemAllocator`] / [`TrackingAllocator`]: ready-made allocators
//! - [`Status`]: the VM status codes delivered to error handlers
//!
//! The engine (`moonbridge-engine`) bridges these to the VM's C callbacks.

#![warn(missing_docs)]

pub mod alloc;
pub mod status;

pub use alloc::{AllocStats, HostAllocator, SystemAllocator, TrackingAllocator};
pub use status::Status;
