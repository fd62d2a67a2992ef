//! # tsl-uniform-gui
//!
//! Build-time instrumentation of shader parameters plus the runtime panel that
//! drives them.
//!
//! ## Pipeline
//!
//! 1. **Discovery** (`discovery`): parse one JS/TS module with oxc and collect
//!    every `const x = uniform(...)` / `texture(...)` declaration, classified by
//!    `classify` and filtered by the comment directives in `directive`.
//! 2. **Synthesis** (`codegen`): splice one registration block after each
//!    declaration and one bootstrap block after the imports, back to front, so
//!    untouched source keeps its exact formatting.
//! 3. **Hook** (`transform`): file filters, build-mode gating and a content
//!    hash cache. Failures never reach the host; the file passes through.
//!
//! ## Runtime
//!
//! `runtime::Controller` is the single panel shared by every instrumented
//! file: binding registry, undo/redo, debounced persistence, presets and drag.
//! Built for `wasm32` with the `wasm` feature, `runtime::wasm` exports it as
//! the `uniformGui` accessor the generated blocks import.
//!
//! ## Invariants
//!
//! - Re-transforming an instrumented file is a no-op; re-evaluating one
//!   replaces its own bindings instead of duplicating them, and leaves other
//!   files' bindings alone.
//! - Programmatic restores (undo, redo, reset, presets, hot reload) never
//!   produce history entries.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod cache;
pub mod classify;
pub mod codegen;
pub mod config;
pub mod directive;
pub mod discovery;
pub mod error;
pub mod runtime;
pub mod scan;
pub mod transform;


pub use classify::ParamKind;
pub use config::{BuildMode, PluginConfig, RuntimeOptions};
pub use discovery::{analyze_source, analyze_source_in, FileAnalysis, ParameterDeclaration};
pub use error::{RuntimeError, TransformError, WidgetError};
pub use scan::{scan_directory, FileReport};
pub use transform::{transform_source, TransformOutcome, Transformer};

#[cfg(feature = "napi")]
pub use transform::transform_native;

#[cfg(feature = "napi")]
#[napi]
pub fn analyze_native(code: String, id: String) -> napi::Result<serde_json::Value> {
    let analysis = analyze_source(&code, &id).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(&analysis.declarations).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn scan_directory_native(root: String, options: Option<String>) -> napi::Result<serde_json::Value> {
    let config = match options {
        Some(json) => PluginConfig::from_json(&json).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => PluginConfig::default(),
    };
    let reports = scan_directory(std::path::Path::new(&root), &config);
    serde_json::to_value(reports).map_err(|e| napi::Error::from_reason(e.to_string()))
}
