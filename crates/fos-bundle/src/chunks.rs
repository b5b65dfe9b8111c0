//! Chunk State Table

use crate::error::ChunkLoadError;
use crate::{ChunkId, ModuleId};
use std::collections::HashMap;

/// Load status of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChunkStatus {
    #[default]
    Unregistered,
    InFlight,
    Loaded,
    /// Last attempt failed; a new attempt may start at any time
    Failed(ChunkLoadError),
}

impl ChunkStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ChunkStatus::Loaded)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, ChunkStatus::InFlight)
    }
}

#[derive(Debug, Default)]
struct ChunkEntry {
    status: ChunkStatus,
    modules: Vec<ModuleId>,
}

/// Per-chunk status and contributed modules.
///
/// Once a chunk is loaded it stays loaded.
#[derive(Debug, Default)]
pub struct ChunkTable {
    entries: HashMap<ChunkId, ChunkEntry>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, chunk: ChunkId) -> ChunkStatus {
        self.entries.get(&chunk)
            .map(|entry| entry.status.clone())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, chunk: ChunkId) -> bool {
        self.entries.get(&chunk).is_some_and(|entry| entry.status.is_loaded())
    }

    /// Returns false if the chunk is already loaded
    pub fn mark_in_flight(&mut self, chunk: ChunkId) -> bool {
        let entry = self.entries.entry(chunk).or_default();
        if entry.status.is_loaded() {
            return false;
        }
        entry.status = ChunkStatus::InFlight;
        true
    }

    pub fn mark_loaded(&mut self, chunk: ChunkId, modules: impl IntoIterator<Item = ModuleId>) {
        let entry = self.entries.entry(chunk).or_default();
        entry.status = ChunkStatus::Loaded;
        for id in modules {
            if !entry.modules.contains(&id) {
                entry.modules.push(id);
            }
        }
    }

    /// Record a failed attempt; ignored for loaded chunks
    pub fn mark_failed(&mut self, chunk: ChunkId, error: ChunkLoadError) {
        let entry = self.entries.entry(chunk).or_default();
        if !entry.status.is_loaded() {
            entry.status = ChunkStatus::Failed(error);
        }
    }

    /// Modules the chunk registered
    pub fn modules(&self, chunk: ChunkId) -> &[ModuleId] {
        self.entries.get(&chunk)
            .map(|entry| entry.modules.as_slice())
            .unwrap_or(&[])
    }

    pub fn loaded_chunks(&self) -> Vec<ChunkId> {
        let mut loaded: Vec<ChunkId> = self.entries.iter()
            .filter(|(_, entry)| entry.status.is_loaded())
            .map(|(id, _)| *id)
            .collect();
        loaded.sort_unstable();
        loaded
    }
}
