//! # tywrap
//!
//! Typed TypeScript wrapper generation for Python modules, plus a pooled
//! JSONL subprocess bridge to call into them at runtime.
//!
//! This crate is the public facade: the generation engine and boundary
//! codec live in [`tywrap_core`], the lifecycle-managed runtime in
//! [`tywrap_runtime`]. Typical use:
//!
//! ```rust
//! use tywrap::generator::{CodeGenerator, GeneratorOptions};
//! use tywrap::model::PythonModule;
//!
//! let description = r#"{
//!     "name": "math_utils",
//!     "functions": [{
//!         "name": "calculate_sum",
//!         "parameters": [{"name": "numbers", "type": {"kind": "collection", "name": "list", "item_types": [{"kind": "primitive", "name": "int"}]}}],
//!         "return_type": {"kind": "primitive", "name": "int"}
//!     }],
//!     "classes": []
//! }"#;
//! let module: PythonModule = serde_json::from_str(description).unwrap();
//! let generated = CodeGenerator::new().generate(&module, &GeneratorOptions::default());
//! assert!(generated.source.contains("calculateSum"));
//! ```

pub use tywrap_core::{cache, codec, error, generator, ident, mapper, model, presets};
pub use tywrap_runtime::{context, pool, protocol, transport};

pub use tywrap_core::error::{BridgeError, BridgeResult};
pub use tywrap_core::generator::{CodeGenerator, GeneratedModule, GeneratorOptions};
pub use tywrap_core::mapper::{TypeContext, TypeMapper};
pub use tywrap_core::presets::PresetPack;
pub use tywrap_runtime::pool::{PoolConfig, WorkerPool};
pub use tywrap_runtime::protocol::{ProtocolClient, ProtocolConfig};
pub use tywrap_runtime::transport::{PythonTransport, TransportConfig};
