//! Bundle Runtime
//!
//! Owns the module registry, the chunk table, in-flight loads and the
//! deferred task queue. Everything runs on one thread; the only suspension
//! points are chunk fetches.
//!
//! Each fetch runs as a task on an executor the runtime owns, so it settles
//! even when every caller has stopped waiting. Awaiting any load future
//! drives that executor; hosts with nothing to await use
//! [`Runtime::block_on`] or [`Runtime::run_pending`].

use crate::chunks::{ChunkStatus, ChunkTable};
use crate::config::RuntimeConfig;
use crate::error::{BundleError, ChunkLoadError, FetchFailure};
use crate::intake::{BundleFragment, IntakeQueue};
use crate::manifest::ChunkManifest;
use crate::registry::{ModuleDef, ModuleRegistry};
use crate::resolver::{DeferredQueue, ResolveOutcome, Step};
use crate::source::{ChunkRequest, ChunkSource, StaticSource};
use crate::value::{Exports, ExportValue};
use crate::{ChunkId, ModuleId, Priority};
use fos_net::{DeduplicationStats, InFlightTable};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use smol::LocalExecutor;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

type LoadResult = Result<(), FetchFailure>;
type SharedLoad = Shared<LocalBoxFuture<'static, LoadResult>>;
type ReadinessCheck = Rc<dyn Fn(ChunkId) -> bool>;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    manifest: ChunkManifest,
    source: Rc<dyn ChunkSource>,
    registry: ModuleRegistry,
    chunks: RefCell<ChunkTable>,
    in_flight: RefCell<InFlightTable<SharedLoad>>,
    deferred: RefCell<DeferredQueue>,
    readiness: RefCell<Vec<(String, ReadinessCheck)>>,
    executor: Rc<LocalExecutor<'static>>,
}

/// Runtime builder
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    manifest: ChunkManifest,
    source: Option<Rc<dyn ChunkSource>>,
    intake: Option<IntakeQueue>,
    modules: Vec<(ModuleId, ModuleDef)>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            manifest: ChunkManifest::default(),
            source: None,
            intake: None,
            modules: Vec::new(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn manifest(mut self, manifest: ChunkManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn source(mut self, source: impl ChunkSource + 'static) -> Self {
        self.source = Some(Rc::new(source));
        self
    }

    /// Queue whose buffered fragments are drained on build
    pub fn intake(mut self, queue: IntakeQueue) -> Self {
        self.intake = Some(queue);
        self
    }

    /// Module present from the start
    pub fn module(mut self, id: impl Into<ModuleId>, def: ModuleDef) -> Self {
        self.modules.push((id.into(), def));
        self
    }

    pub fn build(self) -> Runtime {
        let source = self.source.unwrap_or_else(|| Rc::new(StaticSource::new()));

        let mut chunks = ChunkTable::new();
        for &chunk in &self.config.installed_chunks {
            chunks.mark_loaded(chunk, std::iter::empty());
        }

        let registry = ModuleRegistry::new();
        registry.define_all(self.modules);

        tracing::debug!(
            installed = ?self.config.installed_chunks,
            timeout = ?self.config.load_timeout,
            "creating bundle runtime"
        );

        let runtime = Runtime {
            inner: Rc::new(RuntimeInner {
                config: self.config,
                manifest: self.manifest,
                source,
                registry,
                chunks: RefCell::new(chunks),
                in_flight: RefCell::new(InFlightTable::new()),
                deferred: RefCell::new(DeferredQueue::new()),
                readiness: RefCell::new(Vec::new()),
                executor: Rc::new(LocalExecutor::new()),
            }),
        };

        if let Some(queue) = self.intake {
            queue.attach(&runtime);
        }

        runtime
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a bundle runtime. Clones share the same state.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Runtime with default config and no chunk source
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn manifest(&self) -> &ChunkManifest {
        &self.inner.manifest
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Memoized exports of a module, initializing it on first use
    pub fn require(&self, id: impl Into<ModuleId>) -> Result<Exports, BundleError> {
        self.inner.registry.require(&id.into(), self)
    }

    /// Namespace of a module, shaped by its interop
    pub fn import(&self, id: impl Into<ModuleId>) -> Result<Exports, BundleError> {
        self.inner.registry.import(&id.into(), self)
    }

    /// Value a default import of the module binds to
    pub fn default_export(&self, id: impl Into<ModuleId>) -> Result<ExportValue, BundleError> {
        self.inner.registry.default_export(&id.into(), self)
    }

    pub fn has_module(&self, id: impl Into<ModuleId>) -> bool {
        self.inner.registry.contains(&id.into())
    }

    pub fn is_initialized(&self, id: impl Into<ModuleId>) -> bool {
        self.inner.registry.is_initialized(&id.into())
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.inner.registry.ids()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Merge a fragment's modules, mark its chunks loaded, run its
    /// callback, then run a resolve pass.
    ///
    /// A fragment whose chunks are all loaded already is a duplicate and
    /// only triggers the pass.
    pub fn register(&self, fragment: BundleFragment) -> ResolveOutcome {
        let BundleFragment { chunks, modules, run_after } = fragment;

        if !chunks.is_empty() && chunks.iter().all(|&chunk| self.is_loaded(chunk)) {
            tracing::debug!(?chunks, "duplicate fragment ignored");
            return self.resolve();
        }

        let ids: Vec<ModuleId> = modules.iter().map(|(id, _)| id.clone()).collect();
        tracing::debug!(?chunks, modules = ids.len(), "registering fragment");

        self.inner.registry.define_all(modules);
        {
            let mut table = self.inner.chunks.borrow_mut();
            for &chunk in &chunks {
                table.mark_loaded(chunk, ids.iter().cloned());
            }
        }

        let value = run_after.and_then(|run| run(self));
        self.resolve_with(value)
    }

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    pub fn chunk_status(&self, chunk: ChunkId) -> ChunkStatus {
        self.inner.chunks.borrow().status(chunk)
    }

    pub fn is_loaded(&self, chunk: ChunkId) -> bool {
        self.inner.chunks.borrow().is_loaded(chunk)
    }

    pub fn loaded_chunks(&self) -> Vec<ChunkId> {
        self.inner.chunks.borrow().loaded_chunks()
    }

    /// Modules a loaded chunk registered
    pub fn chunk_modules(&self, chunk: ChunkId) -> Vec<ModuleId> {
        self.inner.chunks.borrow().modules(chunk).to_vec()
    }

    pub fn locator(&self, chunk: ChunkId) -> String {
        self.inner.manifest.locator(chunk)
    }

    pub fn chunk_request(&self, chunk: ChunkId) -> ChunkRequest {
        ChunkRequest {
            chunk,
            locator: self.locator(chunk),
            key: self.inner.config.request_key(chunk),
            nonce: self.inner.config.nonce.clone(),
        }
    }

    /// In-flight load statistics
    pub fn load_stats(&self) -> DeduplicationStats {
        self.inner.in_flight.borrow().stats()
    }

    /// Resources currently being fetched
    pub fn loads_in_flight(&self) -> usize {
        self.inner.in_flight.borrow().pending_count()
    }

    /// Run `future` to completion on this thread, driving pending loads
    /// while it waits
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.inner.executor.run(future))
    }

    /// Make whatever progress pending loads can make without blocking.
    /// Returns true if any load task ran.
    pub fn run_pending(&self) -> bool {
        let mut progressed = false;
        while self.inner.executor.try_tick() {
            progressed = true;
        }
        progressed
    }

    /// Resolve once the chunk's modules are registered.
    ///
    /// Callers asking for a chunk whose resource is already being fetched
    /// share that fetch. A failed or timed-out attempt rejects every
    /// waiter and leaves the chunk free for a new attempt. Dropping the
    /// returned future does not cancel the fetch.
    pub fn ensure_loaded(&self, chunk: ChunkId) -> LocalBoxFuture<'static, Result<(), ChunkLoadError>> {
        if self.is_loaded(chunk) {
            return futures::future::ready(Ok(())).boxed_local();
        }

        let request = self.chunk_request(chunk);
        let joined = self.inner.in_flight.borrow_mut().join(&request.locator);
        let load = match joined {
            Some(load) => {
                tracing::debug!(chunk, locator = %request.locator, "joining in-flight load");
                load
            }
            None => {
                let load = self.start_load(&request);
                self.inner.in_flight.borrow_mut().start(&request.locator, load.clone());
                self.spawn_driver(&request, load.clone());
                load
            }
        };
        self.inner.chunks.borrow_mut().mark_in_flight(chunk);

        let runtime = self.clone();
        let executor = self.inner.executor.clone();
        async move {
            let outcome = executor.run(load).await;
            runtime.settle(&request, outcome)
        }
        .boxed_local()
    }

    /// Load several chunks concurrently.
    ///
    /// Every load settles before this resolves; the error of the first
    /// failed chunk, in argument order, is returned.
    pub fn ensure_all(&self, chunks: impl IntoIterator<Item = ChunkId>) -> LocalBoxFuture<'static, Result<(), ChunkLoadError>> {
        let loads: Vec<_> = chunks.into_iter().map(|chunk| self.ensure_loaded(chunk)).collect();
        futures::future::join_all(loads)
            .map(|results| results.into_iter().collect::<Result<Vec<()>, _>>().map(|_| ()))
            .boxed_local()
    }

    /// Keep a load going with no caller attached, and record its outcome
    fn spawn_driver(&self, request: &ChunkRequest, load: SharedLoad) {
        let weak = self.downgrade();
        let request = request.clone();

        let driver = async move {
            let outcome = load.await;
            if let Some(inner) = weak.upgrade() {
                let _ = Runtime::from_inner(inner).settle(&request, outcome);
            }
        };
        self.inner.executor.spawn(driver).detach();
    }

    fn start_load(&self, request: &ChunkRequest) -> SharedLoad {
        tracing::info!(chunk = request.chunk, locator = %request.locator, "loading chunk");

        let fetch = self.inner.source.load(request);
        let limit = self.inner.config.load_timeout;
        let timer = smol::Timer::after(limit);
        let deadline = async move {
            timer.await;
            Err(FetchFailure::timeout(limit))
        };

        let weak = Rc::downgrade(&self.inner);
        let chunk = request.chunk;
        let locator = request.locator.clone();

        async move {
            let fetched = smol::future::or(fetch, deadline).await;

            let Some(inner) = weak.upgrade() else {
                return fetched.map(|_| ());
            };
            let runtime = Runtime::from_inner(inner);
            let (elapsed, waiters) = {
                let mut in_flight = runtime.inner.in_flight.borrow_mut();
                (in_flight.elapsed(&locator), in_flight.complete(&locator))
            };
            tracing::debug!(locator = %locator, waiters, ?elapsed, "load settled");

            if let Ok(Some(fragment)) = fetched {
                runtime.register(fragment);
                if !runtime.is_loaded(chunk) {
                    tracing::warn!(chunk, locator = %locator, "resource did not provide its chunk");
                }
                return Ok(());
            }

            if let Err(failure) = &fetched {
                tracing::warn!(chunk, locator = %locator, reason = %failure, "chunk load failed");
            }
            fetched.map(|_| ())
        }
        .boxed_local()
        .shared()
    }

    /// Turn the shared outcome of a load into this waiter's result
    fn settle(&self, request: &ChunkRequest, outcome: LoadResult) -> Result<(), ChunkLoadError> {
        if self.is_loaded(request.chunk) {
            return Ok(());
        }

        let failure = match outcome {
            Err(failure) => failure,
            Ok(()) => FetchFailure::missing("resource loaded without registering the chunk"),
        };
        tracing::debug!(chunk = request.chunk, reason = %failure, "rejecting chunk waiter");
        let error = ChunkLoadError::from_failure(request.chunk, &request.locator, failure);

        // A retry may already be under way
        if !self.inner.in_flight.borrow().is_pending(&request.locator) {
            self.inner.chunks.borrow_mut().mark_failed(request.chunk, error.clone());
        }

        Err(error)
    }

    // ------------------------------------------------------------------
    // Deferred tasks
    // ------------------------------------------------------------------

    /// Queue `continuation` until every chunk in `chunks` is ready, then
    /// run a resolve pass.
    pub fn when(
        &self,
        chunks: impl IntoIterator<Item = ChunkId>,
        priority: Priority,
        continuation: impl FnOnce(&Runtime) -> Option<ExportValue> + 'static,
    ) -> ResolveOutcome {
        let chunks: Vec<ChunkId> = chunks.into_iter().collect();
        tracing::debug!(?chunks, priority, "deferring task");

        self.inner.deferred.borrow_mut().insert(chunks, priority, Box::new(continuation));
        self.resolve()
    }

    /// Queue `continuation` and fetch whatever it is waiting on
    pub fn load_and_run(
        &self,
        chunks: impl IntoIterator<Item = ChunkId>,
        priority: Priority,
        continuation: impl FnOnce(&Runtime) -> Option<ExportValue> + 'static,
    ) -> LocalBoxFuture<'static, Result<(), ChunkLoadError>> {
        let chunks: Vec<ChunkId> = chunks.into_iter().collect();
        self.when(chunks.clone(), priority, continuation);

        let missing: Vec<ChunkId> = chunks.into_iter().filter(|&chunk| !self.is_loaded(chunk)).collect();
        self.ensure_all(missing)
    }

    /// Register an extra readiness condition. Tasks only run once every
    /// condition holds for each of their chunks. Replaces a check of the
    /// same name.
    pub fn add_readiness(&self, name: &str, check: impl Fn(ChunkId) -> bool + 'static) {
        let mut readiness = self.inner.readiness.borrow_mut();
        readiness.retain(|(existing, _)| existing != name);
        readiness.push((name.to_string(), Rc::new(check)));
    }

    pub fn remove_readiness(&self, name: &str) -> bool {
        let mut readiness = self.inner.readiness.borrow_mut();
        let before = readiness.len();
        readiness.retain(|(existing, _)| existing != name);
        readiness.len() != before
    }

    /// Loaded, and every readiness check agrees
    pub fn is_ready(&self, chunk: ChunkId) -> bool {
        if !self.is_loaded(chunk) {
            return false;
        }
        let checks: Vec<ReadinessCheck> = self.inner.readiness.borrow()
            .iter()
            .map(|(_, check)| check.clone())
            .collect();
        checks.iter().all(|check| check(chunk))
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.deferred.borrow().len()
    }

    /// Run every deferred task whose chunks are ready
    pub fn resolve(&self) -> ResolveOutcome {
        self.resolve_with(None)
    }

    fn resolve_with(&self, initial: Option<ExportValue>) -> ResolveOutcome {
        let mut value = initial;

        loop {
            // Readiness checks are host code; evaluate them with the queue released
            let awaited = self.inner.deferred.borrow().awaited_chunks();
            let ready: HashSet<ChunkId> = awaited.into_iter()
                .filter(|&chunk| self.is_ready(chunk))
                .collect();

            let step = self.inner.deferred.borrow_mut().take_ready(|chunk| ready.contains(&chunk));
            match step {
                Step::Ready(run) => {
                    if let Some(produced) = run(self) {
                        value = Some(produced);
                    }
                }
                Step::Blocked(blocked_at) => {
                    if let Some(priority) = blocked_at {
                        tracing::debug!(priority, pending = self.pending_tasks(), "resolve pass blocked");
                    }
                    return ResolveOutcome { value, blocked_at };
                }
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.inner.registry.ids().len())
            .field("loaded_chunks", &self.loaded_chunks())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}
