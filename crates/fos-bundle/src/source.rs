//! Chunk Sources
//!
//! Where chunk resources come from: fragments compiled into the host, or
//! JSON data chunks fetched over the network.

use crate::error::{ChunkFailureKind, FetchFailure};
use crate::intake::BundleFragment;
use crate::registry::ModuleDef;
use crate::value::ExportValue;
use crate::ChunkId;
use fos_net::{ResourceLoader, Url};
use futures::future::{FutureExt, LocalBoxFuture};
use indexmap::IndexMap;
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// One attempt to fetch a chunk's resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub chunk: ChunkId,
    pub locator: String,
    /// Identifies the resource to the host, `"{unique_name}chunk-{id}"`
    pub key: String,
    pub nonce: Option<String>,
}

/// Fetches chunk resources.
///
/// A source may hand back the fragment it fetched, or register it through
/// an intake queue itself and return `None`.
pub trait ChunkSource {
    fn load(&self, request: &ChunkRequest) -> LocalBoxFuture<'static, Result<Option<BundleFragment>, FetchFailure>>;
}

type FragmentFactory = Rc<dyn Fn() -> BundleFragment>;

/// Fragments compiled into the host, keyed by locator
#[derive(Default)]
pub struct StaticSource {
    fragments: RefCell<HashMap<String, FragmentFactory>>,
    fetches: Cell<usize>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, locator: &str, factory: impl Fn() -> BundleFragment + 'static) -> Self {
        self.insert(locator, factory);
        self
    }

    pub fn insert(&self, locator: &str, factory: impl Fn() -> BundleFragment + 'static) {
        self.fragments.borrow_mut().insert(locator.to_string(), Rc::new(factory));
    }

    /// Number of loads served so far
    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

impl ChunkSource for StaticSource {
    fn load(&self, request: &ChunkRequest) -> LocalBoxFuture<'static, Result<Option<BundleFragment>, FetchFailure>> {
        self.fetches.set(self.fetches.get() + 1);

        let factory = self.fragments.borrow().get(&request.locator).cloned();
        let result = match factory {
            Some(factory) => Ok(Some(factory())),
            None => Err(FetchFailure::missing(format!("no resource at {}", request.locator))),
        };
        futures::future::ready(result).boxed_local()
    }
}

impl<S: ChunkSource + ?Sized> ChunkSource for Rc<S> {
    fn load(&self, request: &ChunkRequest) -> LocalBoxFuture<'static, Result<Option<BundleFragment>, FetchFailure>> {
        (**self).load(request)
    }
}

/// Wire format of a JSON data chunk
#[derive(Debug, Deserialize)]
struct DataChunk {
    chunks: Vec<ChunkId>,
    #[serde(default)]
    modules: IndexMap<String, serde_json::Value>,
}

/// Decode a JSON data chunk into a fragment.
///
/// Object-valued modules export each field; any other value becomes the
/// module's `default` export.
pub(crate) fn decode_data_chunk(body: &[u8]) -> Result<BundleFragment, FetchFailure> {
    let data: DataChunk = serde_json::from_slice(body)
        .map_err(|e| FetchFailure::new(ChunkFailureKind::Invalid, e.to_string()))?;

    let mut fragment = BundleFragment::new(data.chunks);
    for (id, value) in data.modules {
        let def = ModuleDef::new(move |exports, _| {
            let mut ns = exports.borrow_mut();
            ns.mark_es_module();
            match &value {
                serde_json::Value::Object(fields) => {
                    for (name, field) in fields {
                        ns.set(name.clone(), ExportValue::from(field.clone()));
                    }
                }
                other => ns.set("default", ExportValue::from(other.clone())),
            }
            Ok(())
        });
        fragment = fragment.module_def(id, def);
    }
    Ok(fragment)
}

/// JSON data chunks fetched over the network
#[derive(Clone)]
pub struct NetworkSource {
    loader: ResourceLoader,
    base: Url,
}

impl NetworkSource {
    pub fn new(loader: ResourceLoader, base: Url) -> Self {
        Self { loader, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl ChunkSource for NetworkSource {
    fn load(&self, request: &ChunkRequest) -> LocalBoxFuture<'static, Result<Option<BundleFragment>, FetchFailure>> {
        let loader = self.loader.clone();
        let base = self.base.clone();
        let locator = request.locator.clone();

        async move {
            let response = loader.fetch_relative(&base, &locator)
                .await
                .map_err(FetchFailure::from)?;
            decode_data_chunk(&response.body).map(Some)
        }
        .boxed_local()
    }
}
