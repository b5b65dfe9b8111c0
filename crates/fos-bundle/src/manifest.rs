//! Chunk Manifest
//!
//! Derives the resource locator of a chunk from the name and content-hash
//! tables emitted by the build.

use crate::error::BundleError;
use crate::ChunkId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name and hash tables plus the path template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkManifest {
    /// Prefix of every locator, e.g. `/feature-flags/`
    pub public_path: String,
    /// Directory below the public path
    pub directory: String,
    /// Chunk id -> human-readable name
    pub names: HashMap<ChunkId, String>,
    /// Chunk id -> content hash
    pub hashes: HashMap<ChunkId, String>,
    pub extension: String,
}

impl Default for ChunkManifest {
    fn default() -> Self {
        Self {
            public_path: "/".to_string(),
            directory: "assets/js/".to_string(),
            names: HashMap::new(),
            hashes: HashMap::new(),
            extension: ".js".to_string(),
        }
    }
}

impl ChunkManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_public_path(mut self, public_path: &str) -> Self {
        self.public_path = public_path.to_string();
        self
    }

    pub fn with_directory(mut self, directory: &str) -> Self {
        self.directory = directory.to_string();
        self
    }

    pub fn with_name(mut self, chunk: ChunkId, name: &str) -> Self {
        self.names.insert(chunk, name.to_string());
        self
    }

    pub fn with_hash(mut self, chunk: ChunkId, hash: &str) -> Self {
        self.hashes.insert(chunk, hash.to_string());
        self
    }

    /// File name of a chunk; unmapped ids stand in for name and hash
    pub fn file_name(&self, chunk: ChunkId) -> String {
        let id = chunk.to_string();
        let name = self.names.get(&chunk).unwrap_or(&id);
        let hash = self.hashes.get(&chunk).unwrap_or(&id);
        format!("{}.{}{}", name, hash, self.extension)
    }

    /// Full resource locator of a chunk
    pub fn locator(&self, chunk: ChunkId) -> String {
        format!("{}{}{}", self.public_path, self.directory, self.file_name(chunk))
    }

    /// Reverse lookup of a chunk name. Numeric strings name the chunk
    /// with that id.
    pub fn chunk_for_name(&self, name: &str) -> Option<ChunkId> {
        self.names.iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
            .or_else(|| name.parse().ok())
    }

    /// Locator of the chunk with the given name
    pub fn asset_url(&self, name: &str) -> Option<String> {
        self.chunk_for_name(name).map(|chunk| self.locator(chunk))
    }
}
