//! Runtime errors

use crate::{ChunkId, ModuleId};
use fos_net::NetError;
use std::fmt;
use std::time::Duration;

/// Why a chunk failed to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkFailureKind {
    /// Resource is absent, or loaded without providing the chunk
    Missing,
    /// The load timer fired first
    Timeout,
    /// Transport-level failure
    Transport,
    /// Resource arrived but could not be decoded
    Invalid,
}

impl ChunkFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkFailureKind::Missing => "missing",
            ChunkFailureKind::Timeout => "timeout",
            ChunkFailureKind::Transport => "error",
            ChunkFailureKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ChunkFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a chunk source, before it is attributed to a chunk
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct FetchFailure {
    pub kind: ChunkFailureKind,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(kind: ChunkFailureKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn missing(detail: impl Into<String>) -> Self {
        Self::new(ChunkFailureKind::Missing, detail)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(ChunkFailureKind::Timeout, format!("no response after {:?}", after))
    }
}

impl From<NetError> for FetchFailure {
    fn from(err: NetError) -> Self {
        let kind = match &err {
            e if e.is_not_found() => ChunkFailureKind::Missing,
            NetError::Timeout(_) => ChunkFailureKind::Timeout,
            NetError::Decode(_) | NetError::InvalidUrl(_) => ChunkFailureKind::Invalid,
            _ => ChunkFailureKind::Transport,
        };
        Self::new(kind, err.to_string())
    }
}

/// A chunk could not be loaded.
///
/// Waiters of the failed attempt all receive a copy; the chunk itself
/// stays loadable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ChunkLoadError {
    pub message: String,
    pub kind: ChunkFailureKind,
    pub chunk: ChunkId,
    /// Locator of the resource that failed
    pub request: String,
    /// What the source reported, when the failure came from one
    #[source]
    pub cause: Option<FetchFailure>,
}

impl ChunkLoadError {
    pub fn new(chunk: ChunkId, request: impl Into<String>, kind: ChunkFailureKind) -> Self {
        let request = request.into();
        Self {
            message: format!("Loading chunk {} failed.\n({}: {})", chunk, kind, request),
            kind,
            chunk,
            request,
            cause: None,
        }
    }

    /// Attribute a source failure to a chunk
    pub fn from_failure(chunk: ChunkId, request: impl Into<String>, failure: FetchFailure) -> Self {
        let kind = failure.kind;
        Self {
            cause: Some(failure),
            ..Self::new(chunk, request, kind)
        }
    }

    /// Detail reported by the source, if any
    pub fn detail(&self) -> Option<&str> {
        self.cause.as_ref().map(|cause| cause.detail.as_str())
    }

    /// Error category name
    pub fn name(&self) -> &'static str {
        "ChunkLoadError"
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ChunkFailureKind::Timeout
    }

    pub fn is_missing(&self) -> bool {
        self.kind == ChunkFailureKind::Missing
    }
}

/// Bundle runtime error
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Cannot find module '{0}'")]
    UnknownModule(ModuleId),

    #[error(transparent)]
    ChunkLoad(#[from] ChunkLoadError),

    #[error("Module '{module}' failed to initialize: {error:#}")]
    Init { module: ModuleId, error: anyhow::Error },

    #[error("Invalid chunk manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl BundleError {
    /// The chunk load error, if this is one
    pub fn as_chunk_load(&self) -> Option<&ChunkLoadError> {
        match self {
            BundleError::ChunkLoad(e) => Some(e),
            _ => None,
        }
    }
}
