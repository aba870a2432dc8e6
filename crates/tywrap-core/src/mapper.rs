//! Python-to-TypeScript type mapping.
//!
//! [`TypeMapper::map`] is a pure, total transform over the [`PyType`] sum.
//! Unknown or unmatched shapes fall through to `unknown` rather than
//! erroring; preset packs are consulted before the built-in rules so callers
//! can opt into richer mappings for well-known ecosystems.

use crate::model::{
    CollectionKind, PyPrimitive, PyType, TsParameter, TsPrimitive, TsProperty, TsType,
};
use crate::presets::PresetPack;

/// Where the mapped type will appear. `None` maps to `void` only in return
/// position; everywhere else it is `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeContext {
    Value,
    Return,
}

/// Configurable, pure Python-to-TS type mapper.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    presets: Vec<PresetPack>,
}

impl TypeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables a preset pack. Packs compose; earlier packs win on overlap.
    pub fn with_preset(mut self, preset: PresetPack) -> Self {
        if !self.presets.contains(&preset) {
            self.presets.push(preset);
        }
        self
    }

    pub fn with_presets(mut self, presets: impl IntoIterator<Item = PresetPack>) -> Self {
        for preset in presets {
            self = self.with_preset(preset);
        }
        self
    }

    pub fn presets(&self) -> &[PresetPack] {
        &self.presets
    }

    /// Maps a Python type to its TypeScript counterpart. Total: never fails,
    /// unmatched shapes become `unknown`.
    pub fn map(&self, py: &PyType, context: TypeContext) -> TsType {
        match py {
            PyType::Primitive { name } => self.map_primitive(*name, context),
            PyType::Collection { name, item_types } => self.map_collection(*name, item_types),
            PyType::Union { types } => self.map_union(types),
            PyType::Optional { inner } => TsType::union(vec![
                self.map(inner, TypeContext::Value),
                TsType::primitive(TsPrimitive::Null),
            ]),
            PyType::Generic { name, type_args } => TsType::Generic {
                name: name.clone(),
                type_args: type_args
                    .iter()
                    .map(|arg| self.map(arg, TypeContext::Value))
                    .collect(),
            },
            PyType::Callable {
                parameters,
                return_type,
            } => self.map_callable(parameters.as_deref(), return_type),
            PyType::Literal { value } => TsType::Literal {
                value: value.clone(),
            },
            PyType::Custom { name, module } => self.map_custom(name, module.as_deref()),
            // Shape-transparent wrappers: variance, bounds and metadata are
            // not representable on the TS side.
            PyType::Annotated { base, .. } => self.map(base, context),
            PyType::Final { inner } | PyType::ClassVar { inner } => self.map(inner, context),
            PyType::TypeVar { name, .. } => TsType::Custom {
                name: name.clone(),
                module: Some("typing".to_string()),
            },
        }
    }

    fn map_primitive(&self, name: PyPrimitive, context: TypeContext) -> TsType {
        let prim = match name {
            PyPrimitive::Int | PyPrimitive::Float => TsPrimitive::Number,
            PyPrimitive::Str | PyPrimitive::Bytes => TsPrimitive::String,
            PyPrimitive::Bool => TsPrimitive::Boolean,
            PyPrimitive::None => match context {
                TypeContext::Return => TsPrimitive::Void,
                TypeContext::Value => TsPrimitive::Null,
            },
        };
        TsType::primitive(prim)
    }

    fn map_collection(&self, kind: CollectionKind, item_types: &[PyType]) -> TsType {
        let item = |index: usize| {
            item_types
                .get(index)
                .map_or_else(TsType::unknown, |ty| self.map(ty, TypeContext::Value))
        };
        match kind {
            CollectionKind::List => TsType::array(item(0)),
            CollectionKind::Set | CollectionKind::Frozenset => {
                TsType::generic("Set", vec![item(0)])
            }
            CollectionKind::Tuple => {
                if item_types.is_empty() {
                    TsType::Tuple {
                        elements: vec![TsType::primitive(TsPrimitive::Undefined)],
                    }
                } else {
                    TsType::Tuple {
                        elements: item_types
                            .iter()
                            .map(|ty| self.map(ty, TypeContext::Value))
                            .collect(),
                    }
                }
            }
            CollectionKind::Dict => {
                let key = item(0);
                let key = match key {
                    TsType::Primitive {
                        name: TsPrimitive::String | TsPrimitive::Number,
                    } => key,
                    _ => TsType::primitive(TsPrimitive::String),
                };
                TsType::Object {
                    properties: Vec::new(),
                    index_signature: Some(crate::model::TsIndexSignature {
                        key: Box::new(key),
                        value: Box::new(item(1)),
                    }),
                }
            }
        }
    }

    fn map_union(&self, types: &[PyType]) -> TsType {
        match types {
            [] => TsType::unknown(),
            [single] => self.map(single, TypeContext::Value),
            many => TsType::union(
                many.iter()
                    .map(|ty| self.map(ty, TypeContext::Value))
                    .collect(),
            ),
        }
    }

    fn map_callable(&self, parameters: Option<&[PyType]>, return_type: &PyType) -> TsType {
        let ret = self.map(return_type, TypeContext::Return);
        let parameters = match parameters {
            // Ellipsis sentinel: Callable[..., R]
            None => vec![TsParameter {
                name: "args".to_string(),
                ty: TsType::array(TsType::unknown()),
                optional: false,
                rest: true,
            }],
            Some(params) => params
                .iter()
                .enumerate()
                .map(|(i, ty)| TsParameter {
                    name: format!("arg{i}"),
                    ty: self.map(ty, TypeContext::Value),
                    optional: false,
                    rest: false,
                })
                .collect(),
        };
        TsType::Function {
            parameters,
            return_type: Box::new(ret),
            is_async: false,
        }
    }

    fn map_custom(&self, name: &str, module: Option<&str>) -> TsType {
        let qualified = match module {
            Some(module) => format!("{module}.{name}"),
            None => name.to_string(),
        };

        for preset in &self.presets {
            if let Some(mapped) = preset.lookup(&qualified) {
                return mapped;
            }
        }

        if let Some(mapped) = well_known(&qualified) {
            return mapped;
        }

        // Dotted bare names split on the rightmost `.` so emitted TS
        // identifiers stay valid and cache keys stay stable.
        if module.is_none() {
            if let Some(split_at) = name.rfind('.') {
                let (module_part, name_part) = name.split_at(split_at);
                return TsType::Custom {
                    name: name_part[1..].to_string(),
                    module: Some(module_part.to_string()),
                };
            }
        }

        TsType::Custom {
            name: name.to_string(),
            module: module.map(str::to_string),
        }
    }
}

/// Mappings for well-known `typing`/builtin names. Keys are matched with an
/// optional `typing.`/`builtins.` qualifier stripped.
fn well_known(qualified: &str) -> Option<TsType> {
    let bare = qualified
        .strip_prefix("typing.")
        .or_else(|| qualified.strip_prefix("builtins."))
        .unwrap_or(qualified);
    if bare.contains('.') {
        return None;
    }
    let mapped = match bare {
        "Any" => TsType::unknown(),
        "Never" | "NoReturn" => TsType::primitive(TsPrimitive::Never),
        "LiteralString" | "AnyStr" => TsType::primitive(TsPrimitive::String),
        "object" => TsType::primitive(TsPrimitive::Object),
        "Callable" => TsType::Function {
            parameters: vec![TsParameter {
                name: "args".to_string(),
                ty: TsType::array(TsType::unknown()),
                optional: false,
                rest: true,
            }],
            return_type: Box::new(TsType::unknown()),
            is_async: false,
        },
        "Awaitable" | "Coroutine" => TsType::generic("Promise", vec![TsType::unknown()]),
        "Sequence" => TsType::generic("Array", vec![TsType::unknown()]),
        "Mapping" => TsType::string_index(TsType::unknown()),
        _ => return None,
    };
    Some(mapped)
}

/// Convenience constructor for structural object types used by presets.
pub(crate) fn object_of(properties: Vec<(&str, TsType, bool)>) -> TsType {
    TsType::Object {
        properties: properties
            .into_iter()
            .map(|(name, ty, optional)| TsProperty {
                name: name.to_string(),
                ty,
                optional,
                readonly: false,
            })
            .collect(),
        index_signature: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LiteralValue;

    fn mapper() -> TypeMapper {
        TypeMapper::new()
    }

    #[test]
    fn test_numeric_primitives() {
        for prim in [PyPrimitive::Int, PyPrimitive::Float] {
            assert_eq!(
                mapper().map(&PyType::primitive(prim), TypeContext::Value),
                TsType::primitive(TsPrimitive::Number)
            );
        }
    }

    #[test]
    fn test_none_depends_on_context() {
        let none = PyType::primitive(PyPrimitive::None);
        assert_eq!(
            mapper().map(&none, TypeContext::Return),
            TsType::primitive(TsPrimitive::Void)
        );
        assert_eq!(
            mapper().map(&none, TypeContext::Value),
            TsType::primitive(TsPrimitive::Null)
        );
    }

    #[test]
    fn test_optional_return_stays_nullable() {
        // Optional[T] keeps `T | null` even in return position so optional
        // returns are observable at call sites.
        let ty = PyType::optional(PyType::primitive(PyPrimitive::Int));
        let mapped = mapper().map(&ty, TypeContext::Return);
        assert_eq!(
            mapped,
            TsType::union(vec![
                TsType::primitive(TsPrimitive::Number),
                TsType::primitive(TsPrimitive::Null),
            ])
        );
    }

    #[test]
    fn test_list_and_set() {
        let list = PyType::list(PyType::primitive(PyPrimitive::Str));
        assert_eq!(
            mapper().map(&list, TypeContext::Value),
            TsType::array(TsType::primitive(TsPrimitive::String))
        );
        let set = PyType::Collection {
            name: CollectionKind::Frozenset,
            item_types: vec![PyType::primitive(PyPrimitive::Int)],
        };
        assert_eq!(
            mapper().map(&set, TypeContext::Value),
            TsType::generic("Set", vec![TsType::primitive(TsPrimitive::Number)])
        );
    }

    #[test]
    fn test_tuple_preserves_arity_and_empty_sentinel() {
        let pair = PyType::Collection {
            name: CollectionKind::Tuple,
            item_types: vec![
                PyType::primitive(PyPrimitive::Float),
                PyType::primitive(PyPrimitive::Str),
            ],
        };
        match mapper().map(&pair, TypeContext::Value) {
            TsType::Tuple { elements } => assert_eq!(elements.len(), 2),
            other => panic!("expected tuple, got {other:?}"),
        }

        let empty = PyType::Collection {
            name: CollectionKind::Tuple,
            item_types: vec![],
        };
        assert_eq!(
            mapper().map(&empty, TypeContext::Value),
            TsType::Tuple {
                elements: vec![TsType::primitive(TsPrimitive::Undefined)]
            }
        );
    }

    #[test]
    fn test_dict_key_narrowing() {
        let str_keys = PyType::dict(
            PyType::primitive(PyPrimitive::Str),
            PyType::primitive(PyPrimitive::Int),
        );
        match mapper().map(&str_keys, TypeContext::Value) {
            TsType::Object {
                index_signature: Some(sig),
                ..
            } => assert_eq!(*sig.key, TsType::primitive(TsPrimitive::String)),
            other => panic!("expected indexed object, got {other:?}"),
        }

        // Non-string/number keys collapse to string.
        let tuple_keys = PyType::dict(
            PyType::Collection {
                name: CollectionKind::Tuple,
                item_types: vec![PyType::primitive(PyPrimitive::Int)],
            },
            PyType::primitive(PyPrimitive::Bool),
        );
        match mapper().map(&tuple_keys, TypeContext::Value) {
            TsType::Object {
                index_signature: Some(sig),
                ..
            } => assert_eq!(*sig.key, TsType::primitive(TsPrimitive::String)),
            other => panic!("expected indexed object, got {other:?}"),
        }
    }

    #[test]
    fn test_callable_ellipsis_sentinel() {
        let ty = PyType::Callable {
            parameters: None,
            return_type: Box::new(PyType::primitive(PyPrimitive::Int)),
        };
        match mapper().map(&ty, TypeContext::Value) {
            TsType::Function { parameters, .. } => {
                assert_eq!(parameters.len(), 1);
                assert!(parameters[0].rest);
                assert_eq!(parameters[0].name, "args");
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_callable_positional_parameters() {
        let ty = PyType::Callable {
            parameters: Some(vec![
                PyType::primitive(PyPrimitive::Str),
                PyType::primitive(PyPrimitive::Int),
            ]),
            return_type: Box::new(PyType::primitive(PyPrimitive::Bool)),
        };
        match mapper().map(&ty, TypeContext::Value) {
            TsType::Function { parameters, .. } => {
                assert_eq!(parameters[0].name, "arg0");
                assert_eq!(parameters[1].name, "arg1");
                assert!(!parameters[1].rest);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_typevar_becomes_typing_custom() {
        let ty = PyType::TypeVar {
            name: "T".to_string(),
            bound: None,
            constraints: vec![],
            variance: Some(crate::model::Variance::Covariant),
        };
        assert_eq!(
            mapper().map(&ty, TypeContext::Value),
            TsType::Custom {
                name: "T".to_string(),
                module: Some("typing".to_string()),
            }
        );
    }

    #[test]
    fn test_wrappers_are_transparent_and_idempotent() {
        let base = PyType::primitive(PyPrimitive::Int);
        let wrapped = PyType::Final {
            inner: Box::new(PyType::ClassVar {
                inner: Box::new(PyType::Annotated {
                    base: Box::new(base.clone()),
                    metadata: vec!["meta".to_string()],
                }),
            }),
        };
        assert_eq!(
            mapper().map(&wrapped, TypeContext::Value),
            mapper().map(&base, TypeContext::Value)
        );
    }

    #[test]
    fn test_well_known_typing_names() {
        let m = mapper();
        assert_eq!(
            m.map(&PyType::custom_in("Any", "typing"), TypeContext::Value),
            TsType::unknown()
        );
        assert_eq!(
            m.map(&PyType::custom("NoReturn"), TypeContext::Value),
            TsType::primitive(TsPrimitive::Never)
        );
        assert_eq!(
            m.map(&PyType::custom("LiteralString"), TypeContext::Value),
            TsType::primitive(TsPrimitive::String)
        );
        assert_eq!(
            m.map(&PyType::custom_in("Awaitable", "typing"), TypeContext::Value),
            TsType::generic("Promise", vec![TsType::unknown()])
        );
        assert_eq!(
            m.map(&PyType::custom("Sequence"), TypeContext::Value),
            TsType::generic("Array", vec![TsType::unknown()])
        );
    }

    #[test]
    fn test_dotted_bare_custom_splits_on_rightmost_dot() {
        let ty = PyType::custom("pkg.sub.Widget");
        assert_eq!(
            mapper().map(&ty, TypeContext::Value),
            TsType::Custom {
                name: "Widget".to_string(),
                module: Some("pkg.sub".to_string()),
            }
        );
    }

    #[test]
    fn test_unqualified_custom_passes_through() {
        let ty = PyType::custom_in("Widget", "toolkit");
        assert_eq!(
            mapper().map(&ty, TypeContext::Value),
            TsType::Custom {
                name: "Widget".to_string(),
                module: Some("toolkit".to_string()),
            }
        );
    }

    #[test]
    fn test_literal_passthrough() {
        let ty = PyType::Literal {
            value: LiteralValue::Str("ready".to_string()),
        };
        assert_eq!(
            mapper().map(&ty, TypeContext::Value),
            TsType::Literal {
                value: LiteralValue::Str("ready".to_string()),
            }
        );
    }

    #[test]
    fn test_union_of_one_collapses() {
        let ty = PyType::Union {
            types: vec![PyType::primitive(PyPrimitive::Int)],
        };
        assert_eq!(
            mapper().map(&ty, TypeContext::Value),
            TsType::primitive(TsPrimitive::Number)
        );
    }
}
