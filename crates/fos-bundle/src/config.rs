//! Runtime Configuration

use crate::ChunkId;
use std::time::Duration;

/// Runtime configuration options
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Per-attempt chunk load timeout
    pub load_timeout: Duration,

    /// Prefix of request keys, so a host can tell bundles apart
    pub unique_name: String,

    /// Nonce forwarded with every chunk request
    pub nonce: Option<String>,

    /// Chunks that are part of the runtime itself and never fetched
    pub installed_chunks: Vec<ChunkId>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(120),
            unique_name: "fos:".to_string(),
            nonce: None,
            installed_chunks: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_unique_name(mut self, name: &str) -> Self {
        self.unique_name = name.to_string();
        self
    }

    pub fn with_nonce(mut self, nonce: &str) -> Self {
        self.nonce = Some(nonce.to_string());
        self
    }

    pub fn with_installed_chunks(mut self, chunks: impl IntoIterator<Item = ChunkId>) -> Self {
        self.installed_chunks = chunks.into_iter().collect();
        self
    }

    /// Request key of a chunk
    pub fn request_key(&self, chunk: ChunkId) -> String {
        format!("{}chunk-{}", self.unique_name, chunk)
    }
}
