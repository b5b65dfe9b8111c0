//! Export values and namespaces

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable export container of a module
pub type Exports = Rc<RefCell<Namespace>>;

/// Create an empty export container
pub fn new_exports() -> Exports {
    Rc::new(RefCell::new(Namespace::new()))
}

/// Host function exported by a module
#[derive(Clone)]
pub struct NativeFunction(Rc<dyn Fn(&[ExportValue]) -> ExportValue>);

impl NativeFunction {
    pub fn new(f: impl Fn(&[ExportValue]) -> ExportValue + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[ExportValue]) -> ExportValue {
        (self.0)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeFunction")
    }
}

/// Value stored in an export container
#[derive(Clone, Default)]
pub enum ExportValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ExportValue>),
    Object(Exports),
    Function(NativeFunction),
}

impl ExportValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ExportValue::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ExportValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExportValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExportValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Exports> {
        match self {
            ExportValue::Object(exports) => Some(exports),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            ExportValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Convert to JSON. Functions and undefined become null; cycles are cut.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut Vec::new())
    }

    fn to_json_inner(&self, seen: &mut Vec<*const RefCell<Namespace>>) -> serde_json::Value {
        use serde_json::Value;

        match self {
            ExportValue::Undefined | ExportValue::Null | ExportValue::Function(_) => Value::Null,
            ExportValue::Bool(b) => Value::Bool(*b),
            ExportValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ExportValue::String(s) => Value::String(s.clone()),
            ExportValue::Array(items) => {
                Value::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
            }
            ExportValue::Object(exports) => {
                let ptr = Rc::as_ptr(exports);
                if seen.contains(&ptr) {
                    return Value::Null;
                }
                seen.push(ptr);
                let ns = exports.borrow();
                let map = ns.keys().into_iter()
                    .map(|key| {
                        let value = ns.get(&key).unwrap_or_default().to_json_inner(seen);
                        (key, value)
                    })
                    .collect();
                seen.pop();
                Value::Object(map)
            }
        }
    }
}

impl PartialEq for ExportValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExportValue::Undefined, ExportValue::Undefined) => true,
            (ExportValue::Null, ExportValue::Null) => true,
            (ExportValue::Bool(a), ExportValue::Bool(b)) => a == b,
            (ExportValue::Number(a), ExportValue::Number(b)) => a == b,
            (ExportValue::String(a), ExportValue::String(b)) => a == b,
            (ExportValue::Array(a), ExportValue::Array(b)) => a == b,
            (ExportValue::Object(a), ExportValue::Object(b)) => Rc::ptr_eq(a, b),
            (ExportValue::Function(a), ExportValue::Function(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Debug for ExportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportValue::Undefined => f.write_str("Undefined"),
            ExportValue::Null => f.write_str("Null"),
            ExportValue::Bool(b) => write!(f, "Bool({})", b),
            ExportValue::Number(n) => write!(f, "Number({})", n),
            ExportValue::String(s) => write!(f, "String({:?})", s),
            ExportValue::Array(items) => f.debug_list().entries(items).finish(),
            // Shallow: export graphs may be cyclic
            ExportValue::Object(exports) => match exports.try_borrow() {
                Ok(ns) => write!(f, "Object({:?})", ns.keys()),
                Err(_) => f.write_str("Object(<borrowed>)"),
            },
            ExportValue::Function(_) => f.write_str("Function"),
        }
    }
}

impl From<bool> for ExportValue {
    fn from(b: bool) -> Self {
        ExportValue::Bool(b)
    }
}

impl From<f64> for ExportValue {
    fn from(n: f64) -> Self {
        ExportValue::Number(n)
    }
}

impl From<i32> for ExportValue {
    fn from(n: i32) -> Self {
        ExportValue::Number(n as f64)
    }
}

impl From<&str> for ExportValue {
    fn from(s: &str) -> Self {
        ExportValue::String(s.to_string())
    }
}

impl From<String> for ExportValue {
    fn from(s: String) -> Self {
        ExportValue::String(s)
    }
}

impl From<Exports> for ExportValue {
    fn from(exports: Exports) -> Self {
        ExportValue::Object(exports)
    }
}

impl From<NativeFunction> for ExportValue {
    fn from(f: NativeFunction) -> Self {
        ExportValue::Function(f)
    }
}

impl From<serde_json::Value> for ExportValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => ExportValue::Null,
            Value::Bool(b) => ExportValue::Bool(b),
            Value::Number(n) => ExportValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => ExportValue::String(s),
            Value::Array(items) => ExportValue::Array(items.into_iter().map(ExportValue::from).collect()),
            Value::Object(map) => {
                let exports = new_exports();
                {
                    let mut ns = exports.borrow_mut();
                    for (key, value) in map {
                        ns.set(key, ExportValue::from(value));
                    }
                }
                ExportValue::Object(exports)
            }
        }
    }
}

/// Named exports of a module.
///
/// A namespace may forward lookups to another container, which is how
/// re-exporting namespaces stay live while their source is still
/// initializing.
#[derive(Default)]
pub struct Namespace {
    fields: IndexMap<String, ExportValue>,
    es_module: bool,
    forward: Option<Exports>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace exposing every export of `source`
    pub(crate) fn forwarding(source: Exports) -> Self {
        Self {
            fields: IndexMap::new(),
            es_module: true,
            forward: Some(source),
        }
    }

    /// Look up an export, falling back to the forwarded container
    pub fn get(&self, name: &str) -> Option<ExportValue> {
        if let Some(value) = self.fields.get(name) {
            return Some(value.clone());
        }
        let source = self.forward.as_ref()?;
        let source = source.try_borrow().ok()?;
        source.fields.get(name).cloned()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ExportValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Install an export unless one with that name already exists
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<ExportValue>) -> bool {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return false;
        }
        self.fields.insert(name, value.into());
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<ExportValue> {
        self.fields.shift_remove(name)
    }

    /// Own export (forwarded names excluded)
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Own names followed by forwarded names not shadowed locally
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fields.keys().cloned().collect();
        if let Some(source) = self.forward.as_ref().and_then(|s| s.try_borrow().ok()) {
            for key in source.fields.keys() {
                if !self.fields.contains_key(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tag this container as an ES module namespace
    pub fn mark_es_module(&mut self) {
        self.es_module = true;
    }

    pub fn is_es_module(&self) -> bool {
        self.es_module
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("fields", &self.fields)
            .field("es_module", &self.es_module)
            .field("forwarding", &self.forward.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_keeps_existing() {
        let mut ns = Namespace::new();
        assert!(ns.define("value", 1));
        assert!(!ns.define("value", 2));
        assert_eq!(ns.get("value"), Some(ExportValue::Number(1.0)));
    }

    #[test]
    fn test_forwarding_is_live() {
        let source = new_exports();
        let view = Namespace::forwarding(source.clone());

        assert_eq!(view.get("late"), None);
        source.borrow_mut().set("late", "here");
        assert_eq!(view.get("late"), Some(ExportValue::from("here")));
        assert_eq!(view.keys(), vec!["late".to_string()]);
    }

    #[test]
    fn test_own_field_shadows_forwarded() {
        let source = new_exports();
        source.borrow_mut().set("x", 1);
        let mut view = Namespace::forwarding(source);
        view.set("x", 2);

        assert_eq!(view.get("x"), Some(ExportValue::Number(2.0)));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = new_exports();
        let b = new_exports();
        assert_eq!(ExportValue::Object(a.clone()), ExportValue::Object(a));
        assert_ne!(ExportValue::Object(b), ExportValue::Object(new_exports()));
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({ "flag": true, "items": [1.5, "two", null] });
        let value = ExportValue::from(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_to_json_cuts_cycles() {
        let exports = new_exports();
        exports.borrow_mut().set("self", exports.clone());
        exports.borrow_mut().set("n", 3);

        assert_eq!(
            ExportValue::Object(exports).to_json(),
            serde_json::json!({ "self": null, "n": 3.0 })
        );
    }

    #[test]
    fn test_native_function_call() {
        let double = NativeFunction::new(|args| {
            ExportValue::Number(args.first().and_then(ExportValue::as_number).unwrap_or(0.0) * 2.0)
        });
        assert_eq!(double.call(&[ExportValue::from(21)]), ExportValue::Number(42.0));
    }
}
