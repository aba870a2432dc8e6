//! Canonical type model for the generation pipeline.
//!
//! Two closed sums live here: [`PyType`], describing Python annotations the
//! way the module extractor reports them, and [`TsType`], the TypeScript
//! types the generator emits. Both are plain serde-derived data; all
//! translation logic lives in [`crate::mapper`] and all rendering in
//! [`crate::generator`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A literal value usable in both `Literal[...]` annotations and TS literal
/// types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Python primitive annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PyPrimitive {
    Int,
    Float,
    Str,
    Bool,
    Bytes,
    None,
}

/// Built-in Python container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    List,
    Tuple,
    Set,
    Frozenset,
    Dict,
}

/// Declared variance of a type variable. Not representable in the TS
/// surface; retained so the loss is explicit rather than silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// Python type annotations as a closed sum.
///
/// Invariants: a `Union` has at least two variants; `Collection` with kind
/// `Tuple` preserves positional arity in `item_types`; `Annotated`, `Final`
/// and `ClassVar` are shape-transparent wrappers around their inner type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PyType {
    Primitive {
        name: PyPrimitive,
    },
    Collection {
        name: CollectionKind,
        item_types: Vec<PyType>,
    },
    Union {
        types: Vec<PyType>,
    },
    Optional {
        inner: Box<PyType>,
    },
    Generic {
        name: String,
        type_args: Vec<PyType>,
    },
    Callable {
        /// `None` is the ellipsis sentinel (`Callable[..., R]`).
        parameters: Option<Vec<PyType>>,
        return_type: Box<PyType>,
    },
    Literal {
        value: LiteralValue,
    },
    Custom {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
    },
    Annotated {
        base: Box<PyType>,
        #[serde(default)]
        metadata: Vec<String>,
    },
    #[serde(rename = "typevar")]
    TypeVar {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bound: Option<Box<PyType>>,
        #[serde(default)]
        constraints: Vec<PyType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variance: Option<Variance>,
    },
    Final {
        inner: Box<PyType>,
    },
    #[serde(rename = "classvar")]
    ClassVar {
        inner: Box<PyType>,
    },
}

impl PyType {
    pub fn primitive(name: PyPrimitive) -> Self {
        PyType::Primitive { name }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        PyType::Custom {
            name: name.into(),
            module: None,
        }
    }

    pub fn custom_in(name: impl Into<String>, module: impl Into<String>) -> Self {
        PyType::Custom {
            name: name.into(),
            module: Some(module.into()),
        }
    }

    pub fn list(item: PyType) -> Self {
        PyType::Collection {
            name: CollectionKind::List,
            item_types: vec![item],
        }
    }

    pub fn dict(key: PyType, value: PyType) -> Self {
        PyType::Collection {
            name: CollectionKind::Dict,
            item_types: vec![key, value],
        }
    }

    pub fn optional(inner: PyType) -> Self {
        PyType::Optional {
            inner: Box::new(inner),
        }
    }

    /// Unwraps shape-transparent wrappers down to the carried type.
    pub fn unwrapped(&self) -> &PyType {
        match self {
            PyType::Annotated { base, .. } => base.unwrapped(),
            PyType::Final { inner } | PyType::ClassVar { inner } => inner.unwrapped(),
            other => other,
        }
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(
            self,
            PyType::Annotated { .. } | PyType::Final { .. } | PyType::ClassVar { .. }
        )
    }
}

/// TypeScript primitive names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsPrimitive {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Void,
    Unknown,
    Never,
    Object,
}

impl TsPrimitive {
    pub fn keyword(self) -> &'static str {
        match self {
            TsPrimitive::String => "string",
            TsPrimitive::Number => "number",
            TsPrimitive::Boolean => "boolean",
            TsPrimitive::Null => "null",
            TsPrimitive::Undefined => "undefined",
            TsPrimitive::Void => "void",
            TsPrimitive::Unknown => "unknown",
            TsPrimitive::Never => "never",
            TsPrimitive::Object => "object",
        }
    }
}

/// A property of a structural TS object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsProperty {
    pub name: String,
    pub ty: TsType,
    pub optional: bool,
    pub readonly: bool,
}

/// An index signature, e.g. `{ [key: string]: number }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsIndexSignature {
    pub key: Box<TsType>,
    pub value: Box<TsType>,
}

/// A parameter of a TS function type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsParameter {
    pub name: String,
    pub ty: TsType,
    pub optional: bool,
    pub rest: bool,
}

/// TypeScript types as a closed sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TsType {
    Primitive {
        name: TsPrimitive,
    },
    Array {
        element: Box<TsType>,
    },
    Tuple {
        elements: Vec<TsType>,
    },
    Object {
        properties: Vec<TsProperty>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index_signature: Option<TsIndexSignature>,
    },
    Union {
        types: Vec<TsType>,
    },
    Function {
        parameters: Vec<TsParameter>,
        return_type: Box<TsType>,
        is_async: bool,
    },
    Generic {
        name: String,
        type_args: Vec<TsType>,
    },
    Custom {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
    },
    Literal {
        value: LiteralValue,
    },
}

impl TsType {
    pub fn primitive(name: TsPrimitive) -> Self {
        TsType::Primitive { name }
    }

    pub fn unknown() -> Self {
        TsType::Primitive {
            name: TsPrimitive::Unknown,
        }
    }

    pub fn array(element: TsType) -> Self {
        TsType::Array {
            element: Box::new(element),
        }
    }

    pub fn union(types: Vec<TsType>) -> Self {
        TsType::Union { types }
    }

    pub fn generic(name: impl Into<String>, type_args: Vec<TsType>) -> Self {
        TsType::Generic {
            name: name.into(),
            type_args,
        }
    }

    /// A `{ [key: string]: value }` object with no declared properties.
    pub fn string_index(value: TsType) -> Self {
        TsType::Object {
            properties: Vec::new(),
            index_signature: Some(TsIndexSignature {
                key: Box::new(TsType::primitive(TsPrimitive::String)),
                value: Box::new(value),
            }),
        }
    }
}

pub type Symbol = String;

/// A single Python parameter as the extractor reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Symbol,
    #[serde(rename = "type")]
    pub ty: PyType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Positional variadics (`*args`). At most one per parameter list.
    #[serde(default)]
    pub var_args: bool,
    /// Keyword variadics (`**kwargs`). At most one per parameter list.
    #[serde(default)]
    pub kw_args: bool,
}

impl Parameter {
    pub fn required(name: impl Into<String>, ty: PyType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            default_value: None,
            var_args: false,
            kw_args: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: PyType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, ty)
        }
    }
}

/// A free function of a Python module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonFunction {
    pub name: Symbol,
    pub parameters: SmallVec<[Parameter; 4]>,
    pub return_type: PyType,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_generator: bool,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

/// A method is shaped exactly like a function; `self`/`cls` receivers are
/// still present in `parameters` and are filtered by the generator.
pub type PythonMethod = PythonFunction;

/// What kind of class-like construct the extractor saw. Drives structural
/// versus handle-class emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Class,
    TypedDict,
    Protocol,
    #[serde(rename = "namedtuple")]
    NamedTuple,
    Dataclass,
    Pydantic,
}

impl Default for ClassKind {
    fn default() -> Self {
        ClassKind::Class
    }
}

/// A property (attribute or `@property`) of a Python class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonProperty {
    pub name: Symbol,
    #[serde(rename = "type")]
    pub ty: PyType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub getter: bool,
    #[serde(default)]
    pub setter: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonClass {
    pub name: Symbol,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub methods: Vec<PythonMethod>,
    #[serde(default)]
    pub properties: Vec<PythonProperty>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub kind: ClassKind,
}

/// A parsed Python module: the generation input set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonModule {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<PythonFunction>,
    #[serde(default)]
    pub classes: Vec<PythonClass>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
}
