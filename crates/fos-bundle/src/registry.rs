//! Module Registry
//!
//! Known module factories plus the memoized export container of every
//! module that has been required.

use crate::error::BundleError;
use crate::interop::Interop;
use crate::runtime::Runtime;
use crate::value::{new_exports, Exports, ExportValue};
use crate::ModuleId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Module initializer: populates the export container it is handed
pub type ModuleInit = Rc<dyn Fn(&Exports, &Runtime) -> anyhow::Result<()>>;

/// A registered module
#[derive(Clone)]
pub struct ModuleDef {
    pub interop: Interop,
    init: ModuleInit,
}

impl ModuleDef {
    pub fn new(init: impl Fn(&Exports, &Runtime) -> anyhow::Result<()> + 'static) -> Self {
        Self {
            interop: Interop::Namespace,
            init: Rc::new(init),
        }
    }

    pub fn with_interop(mut self, interop: Interop) -> Self {
        self.interop = interop;
        self
    }

    /// Module whose exports are fixed values
    pub fn constant<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ExportValue>,
    {
        let values: Vec<(String, ExportValue)> = values.into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self::new(move |exports, _| {
            let mut ns = exports.borrow_mut();
            ns.mark_es_module();
            for (name, value) in &values {
                ns.set(name.clone(), value.clone());
            }
            Ok(())
        })
    }
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef").field("interop", &self.interop).finish()
    }
}

/// Module factories and cache
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    factories: RefCell<HashMap<ModuleId, ModuleDef>>,
    cache: RefCell<HashMap<ModuleId, Exports>>,
    namespaces: RefCell<HashMap<ModuleId, Exports>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace factories. Nothing is initialized here.
    pub fn define_all(&self, modules: impl IntoIterator<Item = (ModuleId, ModuleDef)>) {
        let mut factories = self.factories.borrow_mut();
        for (id, def) in modules {
            if self.cache.borrow().contains_key(&id) {
                tracing::debug!(module = %id, "factory replaced after initialization; cached exports kept");
            }
            factories.insert(id, def);
        }
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.factories.borrow().contains_key(id)
    }

    pub fn is_initialized(&self, id: &ModuleId) -> bool {
        self.cache.borrow().contains_key(id)
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.factories.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn interop(&self, id: &ModuleId) -> Result<Interop, BundleError> {
        self.factories.borrow()
            .get(id)
            .map(|def| def.interop)
            .ok_or_else(|| BundleError::UnknownModule(id.clone()))
    }

    /// Return the module's exports, running its initializer on first use.
    ///
    /// The container is cached before the initializer runs, so a module
    /// required again while it is initializing gets the same container.
    pub fn require(&self, id: &ModuleId, runtime: &Runtime) -> Result<Exports, BundleError> {
        if let Some(exports) = self.cache.borrow().get(id) {
            return Ok(exports.clone());
        }

        let def = self.factories.borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| BundleError::UnknownModule(id.clone()))?;

        let exports = new_exports();
        self.cache.borrow_mut().insert(id.clone(), exports.clone());

        tracing::debug!(module = %id, "initializing module");
        (def.init)(&exports, runtime).map_err(|error| BundleError::Init {
            module: id.clone(),
            error,
        })?;

        Ok(exports)
    }

    /// Namespace view of a module, memoized per module
    pub fn import(&self, id: &ModuleId, runtime: &Runtime) -> Result<Exports, BundleError> {
        if let Some(ns) = self.namespaces.borrow().get(id) {
            return Ok(ns.clone());
        }

        let interop = self.interop(id)?;
        let exports = self.require(id, runtime)?;

        // The initializer may have imported this module itself
        if let Some(ns) = self.namespaces.borrow().get(id) {
            return Ok(ns.clone());
        }

        let ns = interop.namespace_for(&exports);
        self.namespaces.borrow_mut().insert(id.clone(), ns.clone());
        Ok(ns)
    }

    pub fn default_export(&self, id: &ModuleId, runtime: &Runtime) -> Result<ExportValue, BundleError> {
        let interop = self.interop(id)?;
        let exports = self.require(id, runtime)?;
        Ok(interop.default_of(&exports))
    }
}
