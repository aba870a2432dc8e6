//! Property tests for mapper totality and identifier validity.

use proptest::prelude::*;
use tywrap_core::ident::{sanitize_identifier, IdentOptions};
use tywrap_core::mapper::{TypeContext, TypeMapper};
use tywrap_core::model::{CollectionKind, LiteralValue, PyPrimitive, PyType};

fn py_primitive() -> impl Strategy<Value = PyType> {
    prop_oneof![
        Just(PyType::primitive(PyPrimitive::Int)),
        Just(PyType::primitive(PyPrimitive::Float)),
        Just(PyType::primitive(PyPrimitive::Str)),
        Just(PyType::primitive(PyPrimitive::Bool)),
        Just(PyType::primitive(PyPrimitive::Bytes)),
        Just(PyType::primitive(PyPrimitive::None)),
    ]
}

fn py_type() -> impl Strategy<Value = PyType> {
    let leaf = prop_oneof![
        py_primitive(),
        "[a-zA-Z_][a-zA-Z0-9_.]{0,12}".prop_map(PyType::custom),
        ("[a-zA-Z_][a-zA-Z0-9_]{0,8}", "[a-zA-Z_][a-zA-Z0-9_.]{0,8}")
            .prop_map(|(name, module)| PyType::custom_in(name, module)),
        any::<i64>().prop_map(|value| PyType::Literal {
            value: LiteralValue::Int(value)
        }),
        "[a-zA-Z_][a-zA-Z0-9_]{0,8}".prop_map(|name| PyType::TypeVar {
            name,
            bound: None,
            constraints: vec![],
            variance: None,
        }),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(PyType::list),
            inner.clone().prop_map(PyType::optional),
            (inner.clone(), inner.clone()).prop_map(|(k, v)| PyType::dict(k, v)),
            prop::collection::vec(inner.clone(), 0..4).prop_map(|item_types| {
                PyType::Collection {
                    name: CollectionKind::Tuple,
                    item_types,
                }
            }),
            prop::collection::vec(inner.clone(), 2..4)
                .prop_map(|types| PyType::Union { types }),
            (prop::collection::vec(inner.clone(), 0..3), inner.clone()).prop_map(
                |(parameters, ret)| PyType::Callable {
                    parameters: Some(parameters),
                    return_type: Box::new(ret),
                }
            ),
            inner.clone().prop_map(|base| PyType::Annotated {
                base: Box::new(base),
                metadata: vec!["meta".to_string()],
            }),
            inner.clone().prop_map(|t| PyType::Final { inner: Box::new(t) }),
            inner.prop_map(|t| PyType::ClassVar { inner: Box::new(t) }),
        ]
    })
}

proptest! {
    /// The mapper is total: any type in the sum maps without panicking, in
    /// both contexts.
    #[test]
    fn mapper_is_total(ty in py_type()) {
        let mapper = TypeMapper::new();
        let _ = mapper.map(&ty, TypeContext::Value);
        let _ = mapper.map(&ty, TypeContext::Return);
    }

    /// Shape-transparent wrappers map exactly as their inner type.
    #[test]
    fn wrappers_are_transparent(ty in py_type()) {
        let mapper = TypeMapper::new();
        let annotated = PyType::Annotated {
            base: Box::new(ty.clone()),
            metadata: vec!["Gt(0)".to_string()],
        };
        let final_ = PyType::Final { inner: Box::new(ty.clone()) };
        for context in [TypeContext::Value, TypeContext::Return] {
            prop_assert_eq!(mapper.map(&annotated, context), mapper.map(&ty, context));
            prop_assert_eq!(mapper.map(&final_, context), mapper.map(&ty, context));
        }
    }

    /// Mapping is deterministic under structural equality.
    #[test]
    fn mapper_is_deterministic(ty in py_type()) {
        let mapper = TypeMapper::new();
        prop_assert_eq!(
            mapper.map(&ty, TypeContext::Value),
            mapper.map(&ty, TypeContext::Value)
        );
    }

    /// Every sanitized identifier is valid TS and never a reserved word.
    #[test]
    fn identifiers_are_always_valid(input in ".{0,40}", preserve_case in any::<bool>()) {
        let out = sanitize_identifier(&input, IdentOptions { preserve_case });
        prop_assert!(!out.is_empty());
        let mut chars = out.chars();
        let first = chars.next().unwrap();
        prop_assert!(first.is_ascii_alphabetic() || first == '_' || first == '$', "{input:?} -> {out:?}");
        for ch in chars {
            prop_assert!(ch.is_ascii_alphanumeric() || ch == '_' || ch == '$', "{input:?} -> {out:?}");
        }
        prop_assert!(!tywrap_core::ident::is_reserved(&out));
    }
}
