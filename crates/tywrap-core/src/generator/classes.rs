//! Kind-driven class emission.
//!
//! Data-shaped kinds (typed dicts, dataclasses, pydantic models) become
//! structural aliases; named tuples become readonly tuple aliases;
//! protocols become structural types with function-typed members; ordinary
//! classes become handle classes whose methods round-trip through the
//! bridge.

use crate::generator::functions::split_parameters;
use crate::generator::render::{render_promise, render_type};
use crate::generator::{emit_jsdoc, GeneratorOptions};
use crate::ident::{sanitize_identifier, IdentOptions};
use crate::mapper::{TypeContext, TypeMapper};
use crate::model::{ClassKind, PythonClass, PythonMethod};
use std::fmt::Write as _;

/// Emits one class-like construct. Returns the number of emitted method
/// signatures (zero for structural kinds).
pub(crate) fn emit_class(
    out: &mut String,
    class: &PythonClass,
    module_name: &str,
    mapper: &TypeMapper,
    options: &GeneratorOptions,
    export: bool,
) -> usize {
    let ts_name = sanitize_identifier(&class.name, IdentOptions::default());
    emit_jsdoc(out, class.docstring.as_deref(), |_| {});
    match class.kind {
        ClassKind::TypedDict | ClassKind::Dataclass | ClassKind::Pydantic => {
            emit_structural_alias(out, class, &ts_name, mapper, export);
            0
        }
        ClassKind::NamedTuple => {
            emit_named_tuple(out, class, &ts_name, mapper, export);
            0
        }
        ClassKind::Protocol => {
            emit_protocol(out, class, &ts_name, mapper, export);
            0
        }
        ClassKind::Class => emit_handle_class(out, class, &ts_name, module_name, mapper, options, export),
    }
}

fn export_kw(export: bool) -> &'static str {
    if export {
        "export "
    } else {
        ""
    }
}

fn emit_structural_alias(
    out: &mut String,
    class: &PythonClass,
    ts_name: &str,
    mapper: &TypeMapper,
    export: bool,
) {
    let _ = write!(out, "{}type {ts_name} = {{", export_kw(export));
    for property in &class.properties {
        let name = sanitize_identifier(&property.name, IdentOptions::default());
        let ty = mapper.map(&property.ty, TypeContext::Value);
        let readonly = if property.readonly { "readonly " } else { "" };
        let optional = if property.optional { "?" } else { "" };
        let _ = write!(out, " {readonly}{name}{optional}: {};", render_type(&ty));
    }
    out.push_str(" };\n");
}

fn emit_named_tuple(
    out: &mut String,
    class: &PythonClass,
    ts_name: &str,
    mapper: &TypeMapper,
    export: bool,
) {
    // Field order is positional: no sorting here.
    let elements: Vec<String> = class
        .properties
        .iter()
        .map(|p| render_type(&mapper.map(&p.ty, TypeContext::Value)))
        .collect();
    let _ = writeln!(
        out,
        "{}type {ts_name} = readonly [{}];",
        export_kw(export),
        elements.join(", ")
    );
}

fn emit_protocol(
    out: &mut String,
    class: &PythonClass,
    ts_name: &str,
    mapper: &TypeMapper,
    export: bool,
) {
    let _ = write!(out, "{}type {ts_name} = {{", export_kw(export));
    for property in &class.properties {
        let name = sanitize_identifier(&property.name, IdentOptions::default());
        let ty = mapper.map(&property.ty, TypeContext::Value);
        let _ = write!(out, " {name}: {};", render_type(&ty));
    }
    let mut methods: Vec<&PythonMethod> = class
        .methods
        .iter()
        .filter(|m| m.name != "__init__")
        .collect();
    methods.sort_by(|a, b| a.name.cmp(&b.name));
    for method in methods {
        let name = sanitize_identifier(&method.name, IdentOptions::default());
        let split = split_parameters(&method.parameters);
        let params = split.render_list(split.positional.len(), mapper);
        let ret = mapper.map(&method.return_type, TypeContext::Return);
        let _ = write!(out, " {name}: ({params}) => {};", render_type(&ret));
    }
    out.push_str(" };\n");
}

fn emit_handle_class(
    out: &mut String,
    class: &PythonClass,
    ts_name: &str,
    module_name: &str,
    mapper: &TypeMapper,
    options: &GeneratorOptions,
    export: bool,
) -> usize {
    let qualified_class = format!("{module_name}.{}", class.name);
    let _ = writeln!(out, "{}class {ts_name} {{", export_kw(export));
    out.push_str("  private readonly _handle: Promise<string>;\n\n");

    // Constructor parameters derive from __init__ when present.
    let init = class.methods.iter().find(|m| m.name == "__init__");
    match init {
        Some(init) => {
            let split = split_parameters(&init.parameters);
            let params = split.render_list(split.positional.len(), mapper);
            let args = split.argument_names().join(", ");
            let _ = writeln!(out, "  constructor({params}) {{");
            let _ = writeln!(
                out,
                "    this._handle = bridge.instantiate(\"{qualified_class}\", [{args}]);"
            );
            out.push_str("  }\n");
        }
        None => {
            out.push_str("  constructor(...args: unknown[]) {\n");
            let _ = writeln!(
                out,
                "    this._handle = bridge.instantiate(\"{qualified_class}\", args);"
            );
            out.push_str("  }\n");
        }
    }

    let mut methods: Vec<&PythonMethod> = class
        .methods
        .iter()
        .filter(|m| m.name != "__init__")
        .collect();
    methods.sort_by(|a, b| a.name.cmp(&b.name));

    let mut signatures = 0;
    for method in methods {
        out.push('\n');
        let name = sanitize_identifier(&method.name, IdentOptions::default());
        let split = split_parameters(&method.parameters);
        let params = split.render_list(split.positional.len(), mapper);
        let ret = mapper.map(&method.return_type, TypeContext::Return);
        let promise = render_promise(&ret);
        let qualified_method = format!("{qualified_class}.{}", method.name);

        let mut jsdoc = String::new();
        emit_jsdoc(&mut jsdoc, method.docstring.as_deref(), |body| {
            if options.annotated_jsdoc {
                for param in &split.positional {
                    let pname = sanitize_identifier(&param.name, IdentOptions::default());
                    let pty = mapper.map(&param.ty, TypeContext::Value);
                    let _ = writeln!(body, " * @param {pname} {}", render_type(&pty));
                }
            }
        });
        for line in jsdoc.lines() {
            let _ = writeln!(out, "  {line}");
        }

        let _ = writeln!(out, "  async {name}({params}): {promise} {{");
        let mut forwarded = vec!["await this._handle".to_string()];
        forwarded.extend(split.argument_names());
        let _ = writeln!(
            out,
            "    return bridge.call(\"{qualified_method}\", [{}]) as {promise};",
            forwarded.join(", ")
        );
        out.push_str("  }\n");
        signatures += 1;
    }

    out.push_str("}\n");
    signatures
}
