//! Module interop
//!
//! How a module's raw exports are presented to importers. Decided once,
//! when the module is registered.

use crate::value::{Exports, ExportValue, Namespace};
use std::cell::RefCell;
use std::rc::Rc;

/// Export shape of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interop {
    /// Exports already form an ES namespace
    #[default]
    Namespace,
    /// Exports become the `default` of a fresh namespace
    DefaultWrap,
    /// Namespace exposing every export of the module, plus `default`
    Reexport,
}

impl Interop {
    /// Build the namespace importers see
    pub(crate) fn namespace_for(self, exports: &Exports) -> Exports {
        match self {
            Interop::Namespace => exports.clone(),
            Interop::DefaultWrap => {
                let mut ns = Namespace::new();
                ns.mark_es_module();
                ns.set("default", ExportValue::Object(exports.clone()));
                Rc::new(RefCell::new(ns))
            }
            Interop::Reexport => {
                let mut ns = Namespace::forwarding(exports.clone());
                ns.define("default", ExportValue::Object(exports.clone()));
                Rc::new(RefCell::new(ns))
            }
        }
    }

    /// The value a default import binds to
    pub(crate) fn default_of(self, exports: &Exports) -> ExportValue {
        match self {
            Interop::Namespace => exports.borrow().get("default").unwrap_or_default(),
            Interop::DefaultWrap | Interop::Reexport => ExportValue::Object(exports.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::new_exports;

    #[test]
    fn test_namespace_is_identity() {
        let exports = new_exports();
        let ns = Interop::Namespace.namespace_for(&exports);
        assert!(Rc::ptr_eq(&ns, &exports));
    }

    #[test]
    fn test_default_wrap() {
        let exports = new_exports();
        exports.borrow_mut().set("answer", 42);

        let ns = Interop::DefaultWrap.namespace_for(&exports);
        assert!(ns.borrow().is_es_module());
        assert_eq!(ns.borrow().get("default"), Some(ExportValue::Object(exports.clone())));
        assert_eq!(ns.borrow().get("answer"), None);
    }

    #[test]
    fn test_reexport_exposes_fields_and_default() {
        let exports = new_exports();
        exports.borrow_mut().set("answer", 42);

        let ns = Interop::Reexport.namespace_for(&exports);
        assert_eq!(ns.borrow().get("answer"), Some(ExportValue::Number(42.0)));
        assert_eq!(ns.borrow().get("default"), Some(ExportValue::Object(exports.clone())));
    }

    #[test]
    fn test_default_of() {
        let exports = new_exports();
        assert!(Interop::Namespace.default_of(&exports).is_undefined());

        exports.borrow_mut().set("default", "main");
        assert_eq!(Interop::Namespace.default_of(&exports), ExportValue::from("main"));
        assert_eq!(Interop::DefaultWrap.default_of(&exports), ExportValue::Object(exports.clone()));
    }
}
