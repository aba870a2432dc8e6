//! Preset mapping packs for well-known Python ecosystems.
//!
//! A preset replaces ad-hoc runtime detection with a fixed table: when the
//! mapper meets a custom type whose qualified name a pack recognizes, the
//! pack's structural mapping wins. Misses cascade to the default
//! custom-type emission.

use crate::mapper::object_of;
use crate::model::{LiteralValue, TsPrimitive, TsType};
use serde::{Deserialize, Serialize};

/// Named groups of extra type-mapping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetPack {
    /// `datetime`/`decimal`/`uuid`/`pathlib` values collapse to their wire
    /// representation (ISO strings, seconds).
    Stdlib,
    Pandas,
    Scipy,
    Torch,
    Sklearn,
}

impl PresetPack {
    /// Every available pack, for "enable everything" callers.
    pub fn all() -> [PresetPack; 5] {
        [
            PresetPack::Stdlib,
            PresetPack::Pandas,
            PresetPack::Scipy,
            PresetPack::Torch,
            PresetPack::Sklearn,
        ]
    }

    /// Looks up a qualified custom-type name (`module.Name`, or bare when
    /// the extractor saw no module).
    pub fn lookup(&self, qualified: &str) -> Option<TsType> {
        match self {
            PresetPack::Stdlib => stdlib_lookup(qualified),
            PresetPack::Pandas => pandas_lookup(qualified),
            PresetPack::Scipy => scipy_lookup(qualified),
            PresetPack::Torch => torch_lookup(qualified),
            PresetPack::Sklearn => sklearn_lookup(qualified),
        }
    }
}

fn matches_any(qualified: &str, names: &[&str]) -> bool {
    names.iter().any(|name| *name == qualified)
}

fn stdlib_lookup(qualified: &str) -> Option<TsType> {
    const AS_STRING: &[&str] = &[
        "datetime.datetime",
        "datetime.date",
        "datetime.time",
        "datetime",
        "date",
        "time",
        "decimal.Decimal",
        "Decimal",
        "uuid.UUID",
        "UUID",
        "pathlib.Path",
        "Path",
    ];
    const AS_NUMBER: &[&str] = &["datetime.timedelta", "timedelta"];

    if matches_any(qualified, AS_STRING) {
        Some(TsType::primitive(TsPrimitive::String))
    } else if matches_any(qualified, AS_NUMBER) {
        Some(TsType::primitive(TsPrimitive::Number))
    } else {
        None
    }
}

fn pandas_lookup(qualified: &str) -> Option<TsType> {
    if matches_any(qualified, &["pandas.DataFrame", "DataFrame"]) {
        // Records orientation or a column map; both shapes appear on the wire.
        Some(TsType::union(vec![
            TsType::primitive(TsPrimitive::Object),
            TsType::array(TsType::primitive(TsPrimitive::Object)),
        ]))
    } else if matches_any(qualified, &["pandas.Series", "Series"]) {
        Some(TsType::union(vec![
            TsType::array(TsType::unknown()),
            TsType::primitive(TsPrimitive::Object),
        ]))
    } else {
        None
    }
}

fn number_array() -> TsType {
    TsType::array(TsType::primitive(TsPrimitive::Number))
}

fn shape_pair() -> TsType {
    TsType::Tuple {
        elements: vec![
            TsType::primitive(TsPrimitive::Number),
            TsType::primitive(TsPrimitive::Number),
        ],
    }
}

fn sparse_format(tag: &str) -> TsType {
    TsType::Literal {
        value: LiteralValue::Str(tag.to_string()),
    }
}

/// Compressed sparse row/column matrices share the indices/indptr layout;
/// coordinate matrices carry row/col instead. The `format` literal is the
/// discriminant.
fn compressed_sparse(tag: &str) -> TsType {
    object_of(vec![
        ("format", sparse_format(tag), false),
        ("shape", shape_pair(), false),
        ("data", number_array(), false),
        ("indices", number_array(), false),
        ("indptr", number_array(), false),
    ])
}

fn coordinate_sparse() -> TsType {
    object_of(vec![
        ("format", sparse_format("coo"), false),
        ("shape", shape_pair(), false),
        ("data", number_array(), false),
        ("row", number_array(), false),
        ("col", number_array(), false),
    ])
}

fn scipy_lookup(qualified: &str) -> Option<TsType> {
    if matches_any(qualified, &["scipy.sparse.csr_matrix", "csr_matrix"]) {
        Some(compressed_sparse("csr"))
    } else if matches_any(qualified, &["scipy.sparse.csc_matrix", "csc_matrix"]) {
        Some(compressed_sparse("csc"))
    } else if matches_any(qualified, &["scipy.sparse.coo_matrix", "coo_matrix"]) {
        Some(coordinate_sparse())
    } else if matches_any(qualified, &["scipy.sparse.spmatrix", "spmatrix"]) {
        Some(TsType::union(vec![
            compressed_sparse("csr"),
            compressed_sparse("csc"),
            coordinate_sparse(),
        ]))
    } else {
        None
    }
}

fn torch_lookup(qualified: &str) -> Option<TsType> {
    if matches_any(qualified, &["torch.Tensor", "Tensor"]) {
        Some(object_of(vec![
            ("data", TsType::unknown(), false),
            ("shape", number_array(), false),
            ("dtype", TsType::primitive(TsPrimitive::String), true),
            ("device", TsType::primitive(TsPrimitive::String), true),
        ]))
    } else {
        None
    }
}

fn sklearn_lookup(qualified: &str) -> Option<TsType> {
    if matches_any(
        qualified,
        &["sklearn.base.BaseEstimator", "sklearn.BaseEstimator", "BaseEstimator"],
    ) {
        Some(object_of(vec![
            ("className", TsType::primitive(TsPrimitive::String), false),
            ("module", TsType::primitive(TsPrimitive::String), false),
            ("version", TsType::primitive(TsPrimitive::String), true),
            ("params", TsType::string_index(TsType::unknown()), false),
        ]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{TypeContext, TypeMapper};
    use crate::model::PyType;

    #[test]
    fn test_stdlib_collapses_temporal_types() {
        let mapper = TypeMapper::new().with_preset(PresetPack::Stdlib);
        for name in ["datetime", "date", "time", "Decimal", "UUID", "Path"] {
            assert_eq!(
                mapper.map(&PyType::custom(name), TypeContext::Value),
                TsType::primitive(TsPrimitive::String),
                "{name}"
            );
        }
        assert_eq!(
            mapper.map(
                &PyType::custom_in("timedelta", "datetime"),
                TypeContext::Value
            ),
            TsType::primitive(TsPrimitive::Number)
        );
    }

    #[test]
    fn test_preset_miss_cascades_to_custom() {
        let mapper = TypeMapper::new().with_preset(PresetPack::Stdlib);
        let mapped = mapper.map(&PyType::custom_in("Widget", "toolkit"), TypeContext::Value);
        assert_eq!(
            mapped,
            TsType::Custom {
                name: "Widget".to_string(),
                module: Some("toolkit".to_string()),
            }
        );
    }

    #[test]
    fn test_pandas_dataframe_union() {
        let mapper = TypeMapper::new().with_preset(PresetPack::Pandas);
        let mapped = mapper.map(
            &PyType::custom_in("DataFrame", "pandas"),
            TypeContext::Value,
        );
        match mapped {
            TsType::Union { types } => assert_eq!(types.len(), 2),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_scipy_formats_are_discriminated() {
        let mapper = TypeMapper::new().with_preset(PresetPack::Scipy);
        let csr = mapper.map(
            &PyType::custom_in("csr_matrix", "scipy.sparse"),
            TypeContext::Value,
        );
        match &csr {
            TsType::Object { properties, .. } => {
                let format = properties.iter().find(|p| p.name == "format").unwrap();
                assert_eq!(
                    format.ty,
                    TsType::Literal {
                        value: LiteralValue::Str("csr".to_string())
                    }
                );
                assert!(properties.iter().any(|p| p.name == "indptr"));
            }
            other => panic!("expected object, got {other:?}"),
        }

        let coo = mapper.map(
            &PyType::custom_in("coo_matrix", "scipy.sparse"),
            TypeContext::Value,
        );
        match &coo {
            TsType::Object { properties, .. } => {
                assert!(properties.iter().any(|p| p.name == "row"));
                assert!(properties.iter().any(|p| p.name == "col"));
                assert!(!properties.iter().any(|p| p.name == "indptr"));
            }
            other => panic!("expected object, got {other:?}"),
        }

        let spmatrix = mapper.map(
            &PyType::custom_in("spmatrix", "scipy.sparse"),
            TypeContext::Value,
        );
        assert!(matches!(spmatrix, TsType::Union { ref types } if types.len() == 3));
    }

    #[test]
    fn test_torch_tensor_shape() {
        let mapper = TypeMapper::new().with_preset(PresetPack::Torch);
        match mapper.map(&PyType::custom_in("Tensor", "torch"), TypeContext::Value) {
            TsType::Object { properties, .. } => {
                assert!(properties.iter().any(|p| p.name == "shape" && !p.optional));
                assert!(properties.iter().any(|p| p.name == "dtype" && p.optional));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_sklearn_estimator_shape() {
        let mapper = TypeMapper::new().with_preset(PresetPack::Sklearn);
        match mapper.map(
            &PyType::custom_in("BaseEstimator", "sklearn.base"),
            TypeContext::Value,
        ) {
            TsType::Object { properties, .. } => {
                assert!(properties.iter().any(|p| p.name == "className"));
                assert!(properties.iter().any(|p| p.name == "params"));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_packs_compose() {
        let mapper = TypeMapper::new().with_presets(PresetPack::all());
        assert_eq!(
            mapper.map(&PyType::custom("UUID"), TypeContext::Value),
            TsType::primitive(TsPrimitive::String)
        );
        assert!(matches!(
            mapper.map(&PyType::custom_in("Tensor", "torch"), TypeContext::Value),
            TsType::Object { .. }
        ));
    }
}
