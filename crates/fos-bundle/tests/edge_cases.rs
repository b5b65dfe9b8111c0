//! Edge case tests for fos-bundle
//!
//! Network-backed chunks, manifests and error reporting.

use fos_bundle::*;
use fos_net::{NetError, ResourceLoader, Response, Transport, Url};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Serves canned responses by URL; anything else is a 404
#[derive(Default)]
struct CannedTransport {
    routes: HashMap<String, (u16, Vec<u8>)>,
    seen: Rc<RefCell<Vec<String>>>,
}

impl CannedTransport {
    fn route(mut self, url: &str, status: u16, body: &str) -> Self {
        self.routes.insert(url.to_string(), (status, body.as_bytes().to_vec()));
        self
    }
}

impl Transport for CannedTransport {
    fn get(&self, url: &Url) -> LocalBoxFuture<'static, Result<Response, NetError>> {
        self.seen.borrow_mut().push(url.to_string());
        let (status, body) = self.routes.get(url.as_str()).cloned().unwrap_or((404, Vec::new()));
        futures::future::ready(Ok(Response { status, headers: Vec::new(), body })).boxed_local()
    }
}

fn network_runtime(transport: CannedTransport) -> Runtime {
    let loader = ResourceLoader::new(transport);
    let base = Url::parse("https://cdn.example/app/").unwrap();

    Runtime::builder()
        .manifest(ChunkManifest::new().with_public_path("").with_name(12, "flags").with_hash(12, "a1b2"))
        .source(NetworkSource::new(loader, base))
        .build()
}

// ============================================================================
// NETWORK SOURCE
// ============================================================================

#[test]
fn test_network_chunk_registers_modules() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let transport = CannedTransport { seen: seen.clone(), ..Default::default() }.route(
        "https://cdn.example/app/assets/js/flags.a1b2.js",
        200,
        r#"{"chunks": [12], "modules": {"flags": {"beta": true, "limit": 3}, "version": "1.2.0"}}"#,
    );
    let runtime = network_runtime(transport);

    smol::block_on(runtime.ensure_loaded(12)).unwrap();

    assert_eq!(*seen.borrow(), vec!["https://cdn.example/app/assets/js/flags.a1b2.js".to_string()]);
    assert_eq!(runtime.chunk_modules(12), vec![ModuleId::from("flags"), ModuleId::from("version")]);

    let flags = runtime.require("flags").unwrap();
    assert_eq!(flags.borrow().get("beta"), Some(ExportValue::Bool(true)));
    assert_eq!(flags.borrow().get("limit"), Some(ExportValue::Number(3.0)));
    assert_eq!(runtime.default_export("version").unwrap(), ExportValue::from("1.2.0"));
}

#[test]
fn test_network_not_found_is_missing() {
    let runtime = network_runtime(CannedTransport::default());

    let err = smol::block_on(runtime.ensure_loaded(3)).unwrap_err();
    assert!(err.is_missing());
    assert_eq!(err.to_string(), "Loading chunk 3 failed.\n(missing: assets/js/3.3.js)");
}

#[test]
fn test_network_server_error_is_transport() {
    let transport = CannedTransport::default().route("https://cdn.example/app/assets/js/4.4.js", 503, "");
    let runtime = network_runtime(transport);

    let err = smol::block_on(runtime.ensure_loaded(4)).unwrap_err();
    assert_eq!(err.kind, ChunkFailureKind::Transport);
    assert_eq!(err.detail(), Some("HTTP error: 503"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_network_malformed_body_is_invalid() {
    let transport = CannedTransport::default().route("https://cdn.example/app/assets/js/4.4.js", 200, "<html>");
    let runtime = network_runtime(transport);

    let err = smol::block_on(runtime.ensure_loaded(4)).unwrap_err();
    assert_eq!(err.kind, ChunkFailureKind::Invalid);
    assert!(!runtime.is_loaded(4));
}

#[test]
fn test_network_chunk_for_other_id_is_missing() {
    let transport = CannedTransport::default().route(
        "https://cdn.example/app/assets/js/4.4.js",
        200,
        r#"{"chunks": [40]}"#,
    );
    let runtime = network_runtime(transport);

    let err = smol::block_on(runtime.ensure_loaded(4)).unwrap_err();
    assert!(err.is_missing());
    assert!(runtime.is_loaded(40));
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_unknown_module_before_chunk_loads() {
    let runtime = Runtime::new();
    let err = runtime.require(17u32).unwrap_err();
    assert_eq!(err.to_string(), "Cannot find module '17'");
}

#[test]
fn test_initializer_error_surfaces_module() {
    let runtime = Runtime::new();
    runtime.register(BundleFragment::new([1]).module("needs-missing", |_, rt| {
        rt.require("absent")?;
        Ok(())
    }));

    match runtime.require("needs-missing") {
        Err(BundleError::Init { module, error }) => {
            assert_eq!(module.as_str(), "needs-missing");
            assert!(error.to_string().contains("absent"));
        }
        other => panic!("expected init error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_chunk_load_error_converts() {
    let runtime = Runtime::new();
    let err: BundleError = smol::block_on(runtime.ensure_loaded(2)).unwrap_err().into();

    let load = err.as_chunk_load().unwrap();
    assert_eq!(load.chunk, 2);
    assert!(load.is_missing());
}

// ============================================================================
// MISC
// ============================================================================

#[test]
fn test_independent_runtimes() {
    let first = Runtime::new();
    let second = Runtime::new();

    first.register(BundleFragment::new([1]).module("only-here", |_, _| Ok(())));
    assert!(first.has_module("only-here"));
    assert!(!second.has_module("only-here"));
    assert!(!second.is_loaded(1));
}

#[test]
fn test_run_after_can_require_its_modules() {
    let runtime = Runtime::new();
    let outcome = runtime.register(
        BundleFragment::new([2])
            .module("entry", |exports, _| {
                exports.borrow_mut().set("name", "docs");
                Ok(())
            })
            .run_after(|rt| {
                let entry = rt.require("entry").ok()?;
                let name = entry.borrow().get("name");
                name
            }),
    );

    assert_eq!(outcome.value, Some(ExportValue::from("docs")));
}

#[test]
fn test_native_function_export() {
    let runtime = Runtime::new();
    runtime.register(BundleFragment::new([3]).module("math", |exports, _| {
        let double = NativeFunction::new(|args| {
            ExportValue::from(args.first().and_then(|v| v.as_number()).unwrap_or(0.0) * 2.0)
        });
        exports.borrow_mut().set("double", double);
        Ok(())
    }));

    let math = runtime.require("math").unwrap();
    let double = math.borrow().get("double").unwrap();
    let result = double.as_function().unwrap().call(&[ExportValue::from(21)]);
    assert_eq!(result, ExportValue::Number(42.0));
}
