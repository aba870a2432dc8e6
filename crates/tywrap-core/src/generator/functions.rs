//! Function wrapper emission: signatures, overload ladders, bodies.

use crate::generator::render::{render_promise, render_type};
use crate::generator::{emit_jsdoc, GeneratorOptions};
use crate::ident::{sanitize_identifier, IdentOptions};
use crate::mapper::{TypeContext, TypeMapper};
use crate::model::{Parameter, PythonFunction};
use std::fmt::Write as _;

/// A parameter list split into the shapes the emitter cares about.
/// `self`/`cls` receivers are dropped here.
pub(crate) struct SplitParams<'a> {
    pub positional: Vec<&'a Parameter>,
    pub var_args: Option<&'a Parameter>,
    pub kw_args: Option<&'a Parameter>,
}

pub(crate) fn split_parameters(parameters: &[Parameter]) -> SplitParams<'_> {
    let mut split = SplitParams {
        positional: Vec::new(),
        var_args: None,
        kw_args: None,
    };
    for param in parameters {
        if param.name == "self" || param.name == "cls" {
            continue;
        }
        if param.var_args {
            split.var_args.get_or_insert(param);
        } else if param.kw_args {
            split.kw_args.get_or_insert(param);
        } else {
            split.positional.push(param);
        }
    }
    split
}

impl SplitParams<'_> {
    /// Renders `head` positional parameters plus the variadic tail.
    pub(crate) fn render_list(&self, head: usize, mapper: &TypeMapper) -> String {
        let mut out = String::new();
        let mut first = true;
        let mut push_sep = |out: &mut String| {
            if !first {
                out.push_str(", ");
            }
            first = false;
        };

        for param in &self.positional[..head] {
            push_sep(&mut out);
            let name = sanitize_identifier(&param.name, IdentOptions::default());
            let ty = mapper.map(&param.ty, TypeContext::Value);
            let marker = if param.optional { "?" } else { "" };
            let _ = write!(out, "{name}{marker}: {}", render_type(&ty));
        }
        // The kwargs bag precedes the rest parameter: TS requires the rest
        // parameter to be last.
        if self.kw_args.is_some() {
            push_sep(&mut out);
            out.push_str("kwargs?: { [key: string]: unknown }");
        }
        if let Some(param) = self.var_args {
            push_sep(&mut out);
            let name = sanitize_identifier(&param.name, IdentOptions::default());
            let _ = write!(out, "...{name}: unknown[]");
        }
        out
    }

    /// Names of the arguments the body forwards, full parameter list.
    pub(crate) fn argument_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .positional
            .iter()
            .map(|p| sanitize_identifier(&p.name, IdentOptions::default()))
            .collect();
        if let Some(param) = self.var_args {
            names.push(format!(
                "...{}",
                sanitize_identifier(&param.name, IdentOptions::default())
            ));
        }
        if self.kw_args.is_some() {
            names.push("kwargs".to_string());
        }
        names
    }

    /// Index of the first optional positional parameter, if any.
    fn first_optional(&self) -> Option<usize> {
        self.positional.iter().position(|p| p.optional)
    }
}

/// Emits a wrapped function (overload ladder, implementation signature, and
/// bridge-calling body). Returns the number of emitted signatures.
pub(crate) fn emit_function(
    out: &mut String,
    func: &PythonFunction,
    qualified_name: &str,
    mapper: &TypeMapper,
    options: &GeneratorOptions,
    export: bool,
) -> usize {
    let split = split_parameters(&func.parameters);
    let ts_name = sanitize_identifier(&func.name, IdentOptions::default());
    let ret = mapper.map(&func.return_type, TypeContext::Return);
    let promise = render_promise(&ret);
    let export_kw = if export { "export " } else { "" };

    emit_jsdoc(out, func.docstring.as_deref(), |jsdoc| {
        if options.annotated_jsdoc {
            annotate_params(jsdoc, &split, mapper);
        }
    });

    // Overload ladder: one declaration per trailing-optional drop point.
    let mut signatures = 0;
    if let Some(first_optional) = split.first_optional() {
        for head in first_optional..split.positional.len() {
            let _ = writeln!(
                out,
                "{export_kw}function {ts_name}({}): {promise};",
                split.render_list(head, mapper)
            );
            signatures += 1;
        }
    }

    let all = split.render_list(split.positional.len(), mapper);
    let _ = writeln!(
        out,
        "{export_kw}async function {ts_name}({all}): {promise} {{"
    );
    let args = split.argument_names().join(", ");
    let _ = writeln!(
        out,
        "  return bridge.call(\"{qualified_name}\", [{args}]) as {promise};"
    );
    out.push_str("}\n");
    signatures + 1
}

fn annotate_params(out: &mut String, split: &SplitParams<'_>, mapper: &TypeMapper) {
    for param in &split.positional {
        let name = sanitize_identifier(&param.name, IdentOptions::default());
        let ty = mapper.map(&param.ty, TypeContext::Value);
        let _ = writeln!(out, " * @param {name} {}", render_type(&ty));
    }
    if let Some(param) = split.var_args {
        let name = sanitize_identifier(&param.name, IdentOptions::default());
        let _ = writeln!(out, " * @param {name} unknown[]");
    }
    if split.kw_args.is_some() {
        let _ = writeln!(out, " * @param kwargs {{ [key: string]: unknown }}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PyPrimitive, PyType};
    use smallvec::smallvec;

    fn func(name: &str, parameters: Vec<Parameter>, return_type: PyType) -> PythonFunction {
        PythonFunction {
            name: name.to_string(),
            parameters: parameters.into(),
            return_type,
            is_async: false,
            is_generator: false,
            decorators: vec![],
            docstring: None,
        }
    }

    fn emit(f: &PythonFunction, qualified: &str) -> (String, usize) {
        let mut out = String::new();
        let mapper = TypeMapper::new();
        let options = GeneratorOptions::default();
        let count = emit_function(&mut out, f, qualified, &mapper, &options, true);
        (out, count)
    }

    #[test]
    fn test_simple_wrapper() {
        let f = func(
            "calculate_sum",
            vec![Parameter::required(
                "numbers",
                PyType::list(PyType::primitive(PyPrimitive::Int)),
            )],
            PyType::primitive(PyPrimitive::Int),
        );
        let (out, count) = emit(&f, "math.calculate_sum");
        assert!(out.contains(
            "export async function calculateSum(numbers: number[]): Promise<number>"
        ));
        assert!(out.contains("bridge.call(\"math.calculate_sum\", [numbers])"));
        assert_eq!(count, 1);
    }

    #[test]
    fn test_overload_ladder() {
        let f = func(
            "create_request",
            vec![
                Parameter::required("url", PyType::primitive(PyPrimitive::Str)),
                Parameter::optional("method", PyType::primitive(PyPrimitive::Str)),
                Parameter::optional(
                    "headers",
                    PyType::dict(
                        PyType::primitive(PyPrimitive::Str),
                        PyType::primitive(PyPrimitive::Str),
                    ),
                ),
                Parameter::optional("timeout", PyType::primitive(PyPrimitive::Int)),
            ],
            PyType::primitive(PyPrimitive::Str),
        );
        let (out, count) = emit(&f, "api.create_request");
        // Three declarations plus the implementation signature.
        assert_eq!(count, 4);
        assert!(out.contains("export function createRequest(url: string): Promise<string>;"));
        assert!(out
            .contains("export function createRequest(url: string, method?: string): Promise<string>;"));
        assert!(out.contains(
            "export function createRequest(url: string, method?: string, headers?: { [key: string]: string; }): Promise<string>;"
        ));
        assert!(out.contains("export async function createRequest(url: string, method?: string, headers?: { [key: string]: string; }, timeout?: number): Promise<string> {"));
        assert!(out.contains("bridge.call(\"api.create_request\", [url, method, headers, timeout])"));
    }

    #[test]
    fn test_self_is_filtered_but_wire_name_is_original() {
        let f = func(
            "default",
            vec![Parameter::required(
                "self",
                PyType::custom("Calculator"),
            )],
            PyType::primitive(PyPrimitive::None),
        );
        let (out, _) = emit(&f, "math.default");
        assert!(out.contains("export async function _default_(): Promise<void>"));
        assert!(out.contains("bridge.call(\"math.default\", [])"));
    }

    #[test]
    fn test_varargs_and_kwargs_rendering() {
        let f = func(
            "run",
            vec![
                Parameter::required("task", PyType::primitive(PyPrimitive::Str)),
                Parameter {
                    var_args: true,
                    ..Parameter::required("extra", PyType::custom("Any"))
                },
                Parameter {
                    kw_args: true,
                    ..Parameter::required("options", PyType::custom("Any"))
                },
            ],
            PyType::primitive(PyPrimitive::Bool),
        );
        let (out, count) = emit(&f, "jobs.run");
        assert_eq!(count, 1);
        assert!(out.contains(
            "export async function run(task: string, kwargs?: { [key: string]: unknown }, ...extra: unknown[]): Promise<boolean>"
        ));
        assert!(out.contains("bridge.call(\"jobs.run\", [task, ...extra, kwargs])"));
    }

    #[test]
    fn test_overloads_keep_variadic_tail() {
        let f = func(
            "spawn",
            vec![
                Parameter::required("cmd", PyType::primitive(PyPrimitive::Str)),
                Parameter::optional("shell", PyType::primitive(PyPrimitive::Bool)),
                Parameter {
                    var_args: true,
                    ..Parameter::required("rest", PyType::custom("Any"))
                },
            ],
            PyType::primitive(PyPrimitive::Int),
        );
        let (out, count) = emit(&f, "proc.spawn");
        assert_eq!(count, 2);
        assert!(out.contains(
            "export function spawn(cmd: string, ...rest: unknown[]): Promise<number>;"
        ));
    }

    #[test]
    fn test_annotated_jsdoc() {
        let mut f = func(
            "scale",
            vec![Parameter::required(
                "factor",
                PyType::primitive(PyPrimitive::Float),
            )],
            PyType::primitive(PyPrimitive::Float),
        );
        f.docstring = Some("Scales the input.".to_string());
        let mut out = String::new();
        let options = GeneratorOptions {
            annotated_jsdoc: true,
            ..GeneratorOptions::default()
        };
        emit_function(
            &mut out,
            &f,
            "geom.scale",
            &TypeMapper::new(),
            &options,
            true,
        );
        assert!(out.contains("/**"));
        assert!(out.contains(" * Scales the input."));
        assert!(out.contains(" * @param factor number"));
    }

    #[test]
    fn test_at_most_one_vararg_honored() {
        let parameters: smallvec::SmallVec<[Parameter; 4]> = smallvec![
            Parameter {
                var_args: true,
                ..Parameter::required("a", PyType::custom("Any"))
            },
            Parameter {
                var_args: true,
                ..Parameter::required("b", PyType::custom("Any"))
            },
        ];
        let split = split_parameters(&parameters);
        assert_eq!(split.var_args.map(|p| p.name.as_str()), Some("a"));
    }
}
