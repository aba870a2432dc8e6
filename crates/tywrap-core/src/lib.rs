//! # tywrap Core — Generation Engine and Boundary Codec
//!
//! Core engine for turning parsed Python module descriptions into typed
//! TypeScript wrapper modules, plus the validating codec used on the
//! subprocess boundary.
//!
//! ## Overview
//!
//! The generation path is a pure pipeline: a [`model::PythonModule`]
//! description flows through the [`mapper::TypeMapper`] into the
//! [`generator::CodeGenerator`], which emits a deterministic TS artifact,
//! optionally memoized by the [`cache::ContentCache`]. The runtime path
//! (in `tywrap-runtime`) uses the [`codec::Codec`] to move validated JSON
//! envelopes to and from a Python subprocess.
//!
//! ## Example
//!
//! ```rust
//! use tywrap_core::generator::{CodeGenerator, GeneratorOptions};
//! use tywrap_core::model::PythonModule;
//!
//! let module: PythonModule = serde_json::from_str(
//!     r#"{"name": "math_utils", "functions": [], "classes": []}"#,
//! ).unwrap();
//! let generated = CodeGenerator::new().generate(&module, &GeneratorOptions::default());
//! assert!(generated.source.starts_with("// Generated by tywrap"));
//! ```
//!
//! ## Key Types
//!
//! - [`model::PyType`] / [`model::TsType`] — the closed type sums
//! - [`mapper::TypeMapper`] — total Python-to-TS type transform
//! - [`generator::CodeGenerator`] — deterministic wrapper emission
//! - [`cache::ContentCache`] — content-addressed generation cache
//! - [`codec::Codec`] — boundary validation and envelope discipline
//! - [`error::BridgeError`] — the five-kind boundary error taxonomy

pub mod cache;
pub mod codec;
pub mod error;
pub mod generator;
pub mod ident;
pub mod mapper;
pub mod model;
pub mod presets;

pub use error::{classify_error, BridgeError, BridgeResult};
