//! Registration Intake
//!
//! Bundle fragments announce the chunks they satisfy and the modules they
//! bring. Fragments can be queued before any runtime exists; the queue is
//! drained in order once a runtime attaches, and later pushes are
//! processed straight away.

use crate::registry::ModuleDef;
use crate::resolver::ResolveOutcome;
use crate::runtime::{Runtime, RuntimeInner};
use crate::value::{Exports, ExportValue};
use crate::{ChunkId, ModuleId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

/// Callback run right after a fragment is registered
pub type RunAfter = Box<dyn FnOnce(&Runtime) -> Option<ExportValue>>;

/// Chunk ids, module factories and an optional callback
pub struct BundleFragment {
    pub(crate) chunks: Vec<ChunkId>,
    pub(crate) modules: Vec<(ModuleId, ModuleDef)>,
    pub(crate) run_after: Option<RunAfter>,
}

impl BundleFragment {
    pub fn new(chunks: impl IntoIterator<Item = ChunkId>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            modules: Vec::new(),
            run_after: None,
        }
    }

    /// Add a namespace module
    pub fn module(
        self,
        id: impl Into<ModuleId>,
        init: impl Fn(&Exports, &Runtime) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.module_def(id, ModuleDef::new(init))
    }

    pub fn module_def(mut self, id: impl Into<ModuleId>, def: ModuleDef) -> Self {
        self.modules.push((id.into(), def));
        self
    }

    pub fn run_after(mut self, f: impl FnOnce(&Runtime) -> Option<ExportValue> + 'static) -> Self {
        self.run_after = Some(Box::new(f));
        self
    }

    pub fn chunk_ids(&self) -> &[ChunkId] {
        &self.chunks
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|(id, _)| id.clone()).collect()
    }
}

impl fmt::Debug for BundleFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleFragment")
            .field("chunks", &self.chunks)
            .field("modules", &self.module_ids())
            .field("run_after", &self.run_after.is_some())
            .finish()
    }
}

#[derive(Default)]
struct IntakeState {
    buffered: VecDeque<BundleFragment>,
    runtime: Option<Weak<RuntimeInner>>,
    draining: bool,
}

/// Append-only fragment queue shared between bundle fragments and a runtime
#[derive(Clone, Default)]
pub struct IntakeQueue {
    state: Rc<RefCell<IntakeState>>,
}

impl IntakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fragment. Returns the resolve outcome if it was registered
    /// immediately, `None` if it was buffered.
    ///
    /// While buffered fragments are being drained, a push (for example
    /// from a run-after callback) is appended behind them and registered
    /// in its turn, so fragments always register in push order.
    pub fn push(&self, fragment: BundleFragment) -> Option<ResolveOutcome> {
        let runtime = {
            let mut state = self.state.borrow_mut();
            let attached = state.runtime.as_ref().and_then(Weak::upgrade);
            match attached {
                Some(inner) if !state.draining => Runtime::from_inner(inner),
                _ => {
                    tracing::debug!(chunks = ?fragment.chunks, "buffering fragment");
                    state.buffered.push_back(fragment);
                    return None;
                }
            }
        };

        Some(runtime.register(fragment))
    }

    /// Fragments waiting for a runtime
    pub fn len(&self) -> usize {
        self.state.borrow().buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().runtime.as_ref().is_some_and(|w| w.strong_count() > 0)
    }

    /// Route this queue to `runtime` and drain what was buffered
    pub(crate) fn attach(&self, runtime: &Runtime) {
        {
            let mut state = self.state.borrow_mut();
            state.runtime = Some(runtime.downgrade());
            state.draining = true;
        }

        // Fragments pushed by run-after callbacks land at the back
        loop {
            let next = self.state.borrow_mut().buffered.pop_front();
            let Some(fragment) = next else { break };
            runtime.register(fragment);
        }

        self.state.borrow_mut().draining = false;
    }
}
