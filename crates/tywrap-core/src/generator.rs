//! TypeScript wrapper generation.
//!
//! [`CodeGenerator::generate`] turns a [`PythonModule`] description into a
//! single TS source artifact plus metadata. Output is deterministic: equal
//! inputs and options produce byte-equal output. Functions and classes are
//! emitted in ascending name order, methods within a class likewise.

pub mod render;

mod classes;
mod functions;

use crate::cache::{cache_key, CacheKeyPart, ContentCache};
use crate::mapper::TypeMapper;
use crate::model::PythonModule;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Instant;
use tracing::debug;

/// Options controlling one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorOptions {
    /// Overrides the module name used in the banner and qualified call
    /// paths; defaults to the described module's own name.
    pub module_name: Option<String>,
    /// Append `@param` annotations derived from parameter type shapes.
    pub annotated_jsdoc: bool,
    /// Export every emitted item. When disabled, only names listed in the
    /// module description's `exports` carry the `export` keyword.
    pub export_all: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            module_name: None,
            annotated_jsdoc: false,
            export_all: true,
        }
    }
}

/// Byte-level description of a finished generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub module_name: String,
    pub function_count: usize,
    pub class_count: usize,
    /// Emitted call signatures, overload declarations included.
    pub signature_count: usize,
    /// Content digest of the generation inputs (module description plus
    /// options).
    pub content_digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedModule {
    pub source: String,
    pub metadata: GenerationMetadata,
}

/// Deterministic module-description-to-TS generator.
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator {
    mapper: TypeMapper,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapper(mapper: TypeMapper) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    /// Generates the TS artifact for a module description.
    ///
    /// Malformed individual items never abort the run; the mapper bottoms
    /// out at `unknown` and emission continues.
    pub fn generate(&self, module: &PythonModule, options: &GeneratorOptions) -> GeneratedModule {
        let module_name = options
            .module_name
            .clone()
            .unwrap_or_else(|| module.name.clone());
        debug!(module = %module_name, "generating wrapper module");

        let mut source = String::new();
        self.emit_header(&mut source, &module_name);

        let exported = |name: &str| -> bool {
            options.export_all
                || module.exports.is_empty()
                || module.exports.iter().any(|e| e == name)
        };

        let mut functions: Vec<_> = module.functions.iter().collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name));
        let mut classes: Vec<_> = module.classes.iter().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut signature_count = 0;
        for function in &functions {
            source.push('\n');
            let qualified = format!("{module_name}.{}", function.name);
            signature_count += functions::emit_function(
                &mut source,
                function,
                &qualified,
                &self.mapper,
                options,
                exported(&function.name),
            );
        }
        for class in &classes {
            source.push('\n');
            signature_count += classes::emit_class(
                &mut source,
                class,
                &module_name,
                &self.mapper,
                options,
                exported(&class.name),
            );
        }

        let content_digest = generation_key(module, options);
        GeneratedModule {
            source,
            metadata: GenerationMetadata {
                module_name,
                function_count: functions.len(),
                class_count: classes.len(),
                signature_count,
                content_digest,
            },
        }
    }

    /// Like [`Self::generate`], consulting a [`ContentCache`] first. Cache
    /// entries depend on the Python module name, so
    /// `invalidate_by_dependency(module)` drops stale artifacts.
    pub fn generate_cached(
        &self,
        module: &PythonModule,
        options: &GeneratorOptions,
        cache: &mut ContentCache,
    ) -> GeneratedModule {
        let key = generation_key(module, options);
        if let Some(entry) = cache.get(&key) {
            if let Ok(cached) = serde_json::from_str::<GeneratedModule>(&entry.data) {
                return cached;
            }
        }

        let started = Instant::now();
        let generated = self.generate(module, options);
        if let Ok(data) = serde_json::to_string(&generated) {
            cache.set(
                &key,
                data,
                crate::cache::SetOptions {
                    dependencies: vec![module.name.clone()],
                    compute_time_ms: started.elapsed().as_millis() as u64,
                    version: None,
                },
            );
        }
        generated
    }

    fn emit_header(&self, out: &mut String, module_name: &str) {
        let _ = writeln!(out, "// Generated by tywrap for Python module \"{module_name}\".");
        out.push_str("// Do not edit: regenerate from the Python source instead.\n\n");
        out.push_str("declare const bridge: {\n");
        out.push_str("  call(target: string, args: unknown[]): Promise<unknown>;\n");
        out.push_str("  instantiate(target: string, args: unknown[]): Promise<string>;\n");
        out.push_str("};\n");
    }
}

/// Cache key over the generation inputs. Serialization of the module
/// description is canonicalized by the key builder, so property insertion
/// order cannot perturb the digest.
fn generation_key(module: &PythonModule, options: &GeneratorOptions) -> String {
    let module_json = serde_json::to_value(module).unwrap_or_default();
    let options_json = serde_json::to_value(options).unwrap_or_default();
    cache_key(
        "gen",
        &[
            CacheKeyPart::Json(&module_json),
            CacheKeyPart::Json(&options_json),
        ],
    )
}

/// Writes a `/** ... */` block assembled from a docstring plus whatever the
/// `extra` hook appends (annotation lines). Emits nothing when both are
/// empty.
pub(crate) fn emit_jsdoc(
    out: &mut String,
    docstring: Option<&str>,
    extra: impl FnOnce(&mut String),
) {
    let mut body = String::new();
    if let Some(doc) = docstring {
        for line in doc.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                body.push_str(" *\n");
            } else {
                let _ = writeln!(body, " * {line}");
            }
        }
    }
    extra(&mut body);
    if body.is_empty() {
        return;
    }
    out.push_str("/**\n");
    out.push_str(&body);
    out.push_str(" */\n");
}
