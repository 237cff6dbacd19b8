//! State construction options

use std::fmt;

use crate::defaults::{DEFAULT_GC_PAUSE, DEFAULT_GC_STEP_MUL};
use crate::error_handler::ErrorHandlerFn;
use crate::libs::{standard_libs, LoadLib};

/// Libraries opened when a state is created
#[derive(Debug, Clone, Default)]
pub enum Libraries {
    /// Every standard library
    #[default]
    Standard,
    /// Nothing; the state starts with an empty global table
    None,
    /// The given entries, in order
    Custom(Vec<LoadLib>),
}

impl Libraries {
    /// Entries to open, in order
    pub fn resolve(&self) -> Vec<LoadLib> {
        match self {
            Libraries::Standard => standard_libs(),
            Libraries::None => Vec::new(),
            Libraries::Custom(libs) => libs.clone(),
        }
    }
}

/// Collector mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcMode {
    /// Incremental mark and sweep (Lua's default)
    Incremental,
    /// Generational collection
    Generational,
}

/// Collector tuning applied at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSettings {
    /// Pause between cycles, in percent of memory in use after a cycle
    pub pause: i32,
    /// Work done per step, relative to allocation
    pub step_mul: i32,
    /// Collector mode
    pub mode: GcMode,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            pause: DEFAULT_GC_PAUSE,
            step_mul: DEFAULT_GC_STEP_MUL,
            mode: GcMode::Incremental,
        }
    }
}

/// Options for [`LuaState::with_options`](crate::LuaState::with_options)
#[derive(Clone, Default)]
pub struct StateOptions {
    /// Libraries opened at creation
    pub libraries: Libraries,

    /// Append a stack traceback to runtime error messages
    pub traceback: bool,

    /// Collector tuning
    pub gc: GcSettings,

    /// Error handler registered before any library is opened. The default
    /// handler (stderr) is used when absent.
    pub error_handler: Option<ErrorHandlerFn>,
}

impl fmt::Debug for StateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateOptions")
            .field("libraries", &self.libraries)
            .field("traceback", &self.traceback)
            .field("gc", &self.gc)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}
