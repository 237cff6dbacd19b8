//! Subcommand implementations.
//!
//! Each returns `Ok(false)` when a script failed; the failure itself has
//! already been reported on stderr by the engine's error handler.

pub mod check;
pub mod eval;
pub mod run;
