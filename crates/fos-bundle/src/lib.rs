//! fOS Bundle Runtime
//!
//! Client-side runtime for bundled applications.
//!
//! Features:
//! - Memoized module registry that tolerates circular initialization
//! - On-demand chunk loading with per-resource deduplication and timeouts
//! - Deferred tasks gated on sets of chunks, run in priority order
//! - Registration intake that accepts fragments before the runtime exists

mod chunks;
mod config;
mod error;
mod interop;
mod intake;
mod manifest;
mod registry;
mod resolver;
mod runtime;
mod source;
mod value;

pub use chunks::{ChunkStatus, ChunkTable};
pub use config::RuntimeConfig;
pub use error::{BundleError, ChunkFailureKind, ChunkLoadError, FetchFailure};
pub use interop::Interop;
pub use intake::{BundleFragment, IntakeQueue, RunAfter};
pub use manifest::ChunkManifest;
pub use registry::{ModuleDef, ModuleInit};
pub use resolver::{Continuation, ResolveOutcome};
pub use runtime::{Runtime, RuntimeBuilder};
pub use source::{ChunkRequest, ChunkSource, NetworkSource, StaticSource};
pub use value::{new_exports, Exports, ExportValue, Namespace, NativeFunction};

use std::fmt;

/// Chunk identifier
pub type ChunkId = u32;

/// Deferred task priority (lower runs first)
pub type Priority = u32;

/// Module identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for ModuleId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl From<&ModuleId> for ModuleId {
    fn from(id: &ModuleId) -> Self {
        id.clone()
    }
}
