//! Rendering of [`TsType`] values to TypeScript source text.
//!
//! This is the only place TS type syntax is produced; the generator proper
//! works in terms of the sum type and calls into here.

use crate::model::{LiteralValue, TsType};
use std::fmt::Write as _;

/// Renders a type expression.
pub fn render_type(ty: &TsType) -> String {
    let mut out = String::new();
    write_type(&mut out, ty);
    out
}

/// Whether a rendering needs parentheses when used as an array element or
/// similar tight position.
fn needs_parens(ty: &TsType) -> bool {
    matches!(ty, TsType::Union { .. } | TsType::Function { .. })
}

fn write_type(out: &mut String, ty: &TsType) {
    match ty {
        TsType::Primitive { name } => out.push_str(name.keyword()),
        TsType::Array { element } => {
            if needs_parens(element) {
                out.push('(');
                write_type(out, element);
                out.push_str(")[]");
            } else {
                write_type(out, element);
                out.push_str("[]");
            }
        }
        TsType::Tuple { elements } => {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_type(out, element);
            }
            out.push(']');
        }
        TsType::Object {
            properties,
            index_signature,
        } => {
            if properties.is_empty() && index_signature.is_none() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            let mut first = true;
            for property in properties {
                if !first {
                    out.push(' ');
                }
                first = false;
                if property.readonly {
                    out.push_str("readonly ");
                }
                out.push_str(&property.name);
                if property.optional {
                    out.push('?');
                }
                out.push_str(": ");
                write_type(out, &property.ty);
                out.push(';');
            }
            if let Some(sig) = index_signature {
                if !first {
                    out.push(' ');
                }
                out.push_str("[key: ");
                write_type(out, &sig.key);
                out.push_str("]: ");
                write_type(out, &sig.value);
                out.push(';');
            }
            out.push_str(" }");
        }
        TsType::Union { types } => {
            for (i, member) in types.iter().enumerate() {
                if i > 0 {
                    out.push_str(" | ");
                }
                if matches!(member, TsType::Function { .. }) {
                    out.push('(');
                    write_type(out, member);
                    out.push(')');
                } else {
                    write_type(out, member);
                }
            }
        }
        TsType::Function {
            parameters,
            return_type,
            is_async,
        } => {
            out.push('(');
            for (i, param) in parameters.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if param.rest {
                    out.push_str("...");
                }
                out.push_str(&param.name);
                if param.optional {
                    out.push('?');
                }
                out.push_str(": ");
                write_type(out, &param.ty);
            }
            out.push_str(") => ");
            if *is_async {
                out.push_str("Promise<");
                write_type(out, return_type);
                out.push('>');
            } else {
                write_type(out, return_type);
            }
        }
        TsType::Generic { name, type_args } => {
            out.push_str(name);
            if !type_args.is_empty() {
                out.push('<');
                for (i, arg) in type_args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_type(out, arg);
                }
                out.push('>');
            }
        }
        TsType::Custom { name, .. } => out.push_str(name),
        TsType::Literal { value } => write_literal(out, value),
    }
}

fn write_literal(out: &mut String, value: &LiteralValue) {
    match value {
        LiteralValue::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                match ch {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        LiteralValue::Int(i) => {
            let _ = write!(out, "{i}");
        }
        LiteralValue::Float(f) => {
            let _ = write!(out, "{f}");
        }
        LiteralValue::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        LiteralValue::Null => out.push_str("null"),
    }
}

/// Wraps a return type in `Promise<...>` unless it already is one.
pub fn render_promise(ty: &TsType) -> String {
    if let TsType::Generic { name, .. } = ty {
        if name == "Promise" {
            return render_type(ty);
        }
    }
    format!("Promise<{}>", render_type(ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TsParameter, TsPrimitive, TsProperty};

    #[test]
    fn test_array_of_union_parenthesized() {
        let ty = TsType::array(TsType::union(vec![
            TsType::primitive(TsPrimitive::String),
            TsType::primitive(TsPrimitive::Null),
        ]));
        assert_eq!(render_type(&ty), "(string | null)[]");
    }

    #[test]
    fn test_plain_array() {
        let ty = TsType::array(TsType::primitive(TsPrimitive::Number));
        assert_eq!(render_type(&ty), "number[]");
    }

    #[test]
    fn test_object_with_optional_and_readonly() {
        let ty = TsType::Object {
            properties: vec![
                TsProperty {
                    name: "id".to_string(),
                    ty: TsType::primitive(TsPrimitive::Number),
                    optional: false,
                    readonly: false,
                },
                TsProperty {
                    name: "email".to_string(),
                    ty: TsType::primitive(TsPrimitive::String),
                    optional: true,
                    readonly: true,
                },
            ],
            index_signature: None,
        };
        assert_eq!(render_type(&ty), "{ id: number; readonly email?: string; }");
    }

    #[test]
    fn test_index_signature() {
        let ty = TsType::string_index(TsType::primitive(TsPrimitive::String));
        assert_eq!(render_type(&ty), "{ [key: string]: string; }");
    }

    #[test]
    fn test_tuple() {
        let ty = TsType::Tuple {
            elements: vec![
                TsType::primitive(TsPrimitive::Number),
                TsType::primitive(TsPrimitive::Number),
            ],
        };
        assert_eq!(render_type(&ty), "[number, number]");
    }

    #[test]
    fn test_function_with_rest() {
        let ty = TsType::Function {
            parameters: vec![TsParameter {
                name: "args".to_string(),
                ty: TsType::array(TsType::unknown()),
                optional: false,
                rest: true,
            }],
            return_type: Box::new(TsType::unknown()),
            is_async: false,
        };
        assert_eq!(render_type(&ty), "(...args: unknown[]) => unknown");
    }

    #[test]
    fn test_generic_and_literal() {
        let ty = TsType::generic("Set", vec![TsType::primitive(TsPrimitive::Number)]);
        assert_eq!(render_type(&ty), "Set<number>");
        let lit = TsType::Literal {
            value: LiteralValue::Str("csr".to_string()),
        };
        assert_eq!(render_type(&lit), "\"csr\"");
    }

    #[test]
    fn test_promise_wrapping_is_idempotent() {
        let already = TsType::generic("Promise", vec![TsType::unknown()]);
        assert_eq!(render_promise(&already), "Promise<unknown>");
        let plain = TsType::primitive(TsPrimitive::Number);
        assert_eq!(render_promise(&plain), "Promise<number>");
    }
}
