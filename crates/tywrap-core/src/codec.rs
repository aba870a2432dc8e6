//! Boundary codec: payload validation, request encoding, response decoding.
//!
//! The codec owns the wire guardrails: no non-finite numbers, no non-string
//! keys on map-like containers, an explicit binary-data policy, and
//! symmetric payload-size caps. Responses carrying a numeric `id` are
//! protocol envelopes and are held to envelope discipline; everything else
//! passes through as plain JSON.

use crate::error::{BridgeError, BridgeResult, CodecPhase, CodecValue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

/// Version tag carried by every request envelope. A response may omit the
/// tag; a present-but-different tag is a protocol error.
pub const PROTOCOL_VERSION: &str = "tywrap/1";

/// Wire key marking a wrapped binary value.
pub const BYTES_SENTINEL: &str = "__tywrap_bytes__";
/// Wire key marking an ndarray payload for the deep decoder.
pub const NDARRAY_SENTINEL: &str = "__tywrap_ndarray__";
/// Wire key marking a split-orientation tabular payload.
pub const DATAFRAME_SENTINEL: &str = "__tywrap_dataframe__";

/// How the encoder treats binary values in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BytesPolicy {
    /// Wrap as `{ "__tywrap_bytes__": true, "b64": ... }`.
    #[default]
    Base64,
    /// Fail encoding, naming the JSON path of the offender.
    Reject,
    /// Defer to the serializer (a plain array of byte values).
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub reject_non_finite: bool,
    pub reject_non_string_keys: bool,
    pub bytes: BytesPolicy,
    /// Encoded byte-length cap, enforced symmetrically on decode.
    pub max_payload_bytes: usize,
    /// Structural recursion guard for pathological nesting.
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            reject_non_finite: true,
            reject_non_string_keys: true,
            bytes: BytesPolicy::default(),
            max_payload_bytes: 10 * 1024 * 1024,
            max_depth: 256,
        }
    }
}

/// A boundary value before encoding. Unlike `serde_json::Value`, the tree
/// can hold non-finite floats and raw bytes: both exist precisely so the
/// validator can see and reject/wrap them. `Map` models a map-like
/// container whose keys may be non-strings; `Object` keys are strings by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<PayloadValue>),
    Object(IndexMap<String, PayloadValue>),
    Map(Vec<(PayloadValue, PayloadValue)>),
}

impl PayloadValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => PayloadValue::Null,
            Value::Bool(b) => PayloadValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PayloadValue::Int(i)
                } else {
                    PayloadValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => PayloadValue::Str(s),
            Value::Array(items) => {
                PayloadValue::Array(items.into_iter().map(Self::from_json).collect())
            }
            Value::Object(map) => PayloadValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Lowers to plain JSON after validation. Bytes follow the policy.
    fn to_json(&self, bytes: BytesPolicy) -> Value {
        match self {
            PayloadValue::Null => Value::Null,
            PayloadValue::Bool(b) => Value::Bool(*b),
            PayloadValue::Int(i) => Value::Number((*i).into()),
            PayloadValue::Float(f) => Number::from_f64(*f)
                .map_or(Value::Null, Value::Number),
            PayloadValue::Str(s) => Value::String(s.clone()),
            PayloadValue::Bytes(bytes_value) => match bytes {
                BytesPolicy::Base64 | BytesPolicy::Reject => json!({
                    BYTES_SENTINEL: true,
                    "b64": BASE64.encode(bytes_value),
                }),
                BytesPolicy::Passthrough => Value::Array(
                    bytes_value
                        .iter()
                        .map(|b| Value::Number((*b).into()))
                        .collect(),
                ),
            },
            PayloadValue::Array(items) => {
                Value::Array(items.iter().map(|item| item.to_json(bytes)).collect())
            }
            PayloadValue::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json(bytes));
                }
                Value::Object(out)
            }
            PayloadValue::Map(entries) => {
                // Post-validation all keys are strings.
                let mut out = Map::new();
                for (key, value) in entries {
                    if let PayloadValue::Str(key) = key {
                        out.insert(key.clone(), value.to_json(bytes));
                    }
                }
                Value::Object(out)
            }
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Str(s.to_string())
    }
}

impl From<i64> for PayloadValue {
    fn from(i: i64) -> Self {
        PayloadValue::Int(i)
    }
}

impl From<f64> for PayloadValue {
    fn from(f: f64) -> Self {
        PayloadValue::Float(f)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

/// Wire method names. snake_case on the wire, matching Python conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMethod {
    Call,
    Instantiate,
    CallMethod,
    DisposeInstance,
}

impl WireMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            WireMethod::Call => "call",
            WireMethod::Instantiate => "instantiate",
            WireMethod::CallMethod => "call_method",
            WireMethod::DisposeInstance => "dispose_instance",
        }
    }
}

/// Per-method request parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestParams {
    Call {
        module: String,
        function_name: String,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    },
    Instantiate {
        module: String,
        class_name: String,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    },
    CallMethod {
        handle: String,
        method_name: String,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    },
    DisposeInstance {
        handle: String,
    },
}

impl RequestParams {
    pub fn method(&self) -> WireMethod {
        match self {
            RequestParams::Call { .. } => WireMethod::Call,
            RequestParams::Instantiate { .. } => WireMethod::Instantiate,
            RequestParams::CallMethod { .. } => WireMethod::CallMethod,
            RequestParams::DisposeInstance { .. } => WireMethod::DisposeInstance,
        }
    }

    fn args(&self) -> Option<&[PayloadValue]> {
        match self {
            RequestParams::Call { args, .. }
            | RequestParams::Instantiate { args, .. }
            | RequestParams::CallMethod { args, .. } => Some(args),
            RequestParams::DisposeInstance { .. } => None,
        }
    }

    fn kwargs(&self) -> Option<&IndexMap<String, PayloadValue>> {
        match self {
            RequestParams::Call { kwargs, .. }
            | RequestParams::Instantiate { kwargs, .. }
            | RequestParams::CallMethod { kwargs, .. } => kwargs.as_ref(),
            RequestParams::DisposeInstance { .. } => None,
        }
    }
}

/// One request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub params: RequestParams,
}

impl Request {
    pub fn call(
        id: u64,
        module: impl Into<String>,
        function_name: impl Into<String>,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> Self {
        Self {
            id,
            params: RequestParams::Call {
                module: module.into(),
                function_name: function_name.into(),
                args,
                kwargs,
            },
        }
    }

    pub fn instantiate(
        id: u64,
        module: impl Into<String>,
        class_name: impl Into<String>,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> Self {
        Self {
            id,
            params: RequestParams::Instantiate {
                module: module.into(),
                class_name: class_name.into(),
                args,
                kwargs,
            },
        }
    }

    pub fn call_method(
        id: u64,
        handle: impl Into<String>,
        method_name: impl Into<String>,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> Self {
        Self {
            id,
            params: RequestParams::CallMethod {
                handle: handle.into(),
                method_name: method_name.into(),
                args,
                kwargs,
            },
        }
    }

    pub fn dispose_instance(id: u64, handle: impl Into<String>) -> Self {
        Self {
            id,
            params: RequestParams::DisposeInstance {
                handle: handle.into(),
            },
        }
    }
}

/// The validating boundary codec.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Validates and encodes one request envelope as a single JSON line
    /// (no trailing newline).
    pub fn encode_request(&self, request: &Request) -> BridgeResult<String> {
        if let Some(args) = request.params.args() {
            for (i, arg) in args.iter().enumerate() {
                self.validate(arg, &format!("args[{i}]"), 0)?;
            }
        }
        if let Some(kwargs) = request.params.kwargs() {
            for (key, value) in kwargs {
                self.validate(value, &format!("kwargs.{key}"), 0)?;
            }
        }

        let params = self.params_to_json(&request.params);
        let envelope = json!({
            "id": request.id,
            "protocol": PROTOCOL_VERSION,
            "method": request.params.method().as_str(),
            "params": params,
        });
        let line = serde_json::to_string(&envelope).map_err(|err| {
            BridgeError::codec(
                CodecPhase::Encode,
                CodecValue::Json,
                format!("request serialization failed: {err}"),
                None,
            )
        })?;
        if line.len() > self.config.max_payload_bytes {
            return Err(BridgeError::codec(
                CodecPhase::Encode,
                CodecValue::Payload,
                format!(
                    "encoded payload is {} bytes, exceeding the {}-byte cap",
                    line.len(),
                    self.config.max_payload_bytes
                ),
                None,
            ));
        }
        Ok(line)
    }

    fn params_to_json(&self, params: &RequestParams) -> Value {
        let bytes = self.config.bytes;
        let args_json = |args: &[PayloadValue]| -> Value {
            Value::Array(args.iter().map(|a| a.to_json(bytes)).collect())
        };
        let kwargs_json = |kwargs: &Option<IndexMap<String, PayloadValue>>| -> Option<Value> {
            kwargs.as_ref().map(|map| {
                let mut out = Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json(bytes));
                }
                Value::Object(out)
            })
        };

        let mut out = Map::new();
        match params {
            RequestParams::Call {
                module,
                function_name,
                args,
                kwargs,
            } => {
                out.insert("module".into(), Value::String(module.clone()));
                out.insert("functionName".into(), Value::String(function_name.clone()));
                out.insert("args".into(), args_json(args));
                if let Some(kw) = kwargs_json(kwargs) {
                    out.insert("kwargs".into(), kw);
                }
            }
            RequestParams::Instantiate {
                module,
                class_name,
                args,
                kwargs,
            } => {
                out.insert("module".into(), Value::String(module.clone()));
                out.insert("className".into(), Value::String(class_name.clone()));
                out.insert("args".into(), args_json(args));
                if let Some(kw) = kwargs_json(kwargs) {
                    out.insert("kwargs".into(), kw);
                }
            }
            RequestParams::CallMethod {
                handle,
                method_name,
                args,
                kwargs,
            } => {
                out.insert("handle".into(), Value::String(handle.clone()));
                out.insert("methodName".into(), Value::String(method_name.clone()));
                out.insert("args".into(), args_json(args));
                if let Some(kw) = kwargs_json(kwargs) {
                    out.insert("kwargs".into(), kw);
                }
            }
            RequestParams::DisposeInstance { handle } => {
                out.insert("handle".into(), Value::String(handle.clone()));
            }
        }
        Value::Object(out)
    }

    /// Guardrail walk. Paths follow `a.b[2].c` form rooted at the
    /// parameter position.
    fn validate(&self, value: &PayloadValue, path: &str, depth: usize) -> BridgeResult<()> {
        if depth > self.config.max_depth {
            return Err(BridgeError::codec(
                CodecPhase::Encode,
                CodecValue::Payload,
                format!("payload nesting exceeds {} levels", self.config.max_depth),
                Some(path.to_string()),
            ));
        }
        match value {
            PayloadValue::Float(f) if self.config.reject_non_finite && !f.is_finite() => {
                Err(BridgeError::codec(
                    CodecPhase::Encode,
                    CodecValue::Number,
                    format!("non-finite number ({f}) at {path}"),
                    Some(path.to_string()),
                ))
            }
            PayloadValue::Bytes(_) if self.config.bytes == BytesPolicy::Reject => {
                Err(BridgeError::codec(
                    CodecPhase::Encode,
                    CodecValue::Bytes,
                    format!("binary data at {path} rejected by policy"),
                    Some(path.to_string()),
                ))
            }
            PayloadValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.validate(item, &format!("{path}[{i}]"), depth + 1)?;
                }
                Ok(())
            }
            PayloadValue::Object(map) => {
                for (key, item) in map {
                    self.validate(item, &format!("{path}.{key}"), depth + 1)?;
                }
                Ok(())
            }
            PayloadValue::Map(entries) => {
                for (i, (key, item)) in entries.iter().enumerate() {
                    match key {
                        PayloadValue::Str(key_str) => {
                            self.validate(item, &format!("{path}.{key_str}"), depth + 1)?;
                        }
                        _ if self.config.reject_non_string_keys => {
                            return Err(BridgeError::codec(
                                CodecPhase::Encode,
                                CodecValue::Json,
                                format!("non-string key (entry {i}) on map-like container at {path}"),
                                Some(path.to_string()),
                            ));
                        }
                        _ => self.validate(item, &format!("{path}[{i}]"), depth + 1)?,
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Decodes one response line. Envelopes yield their `result` or fail
    /// with the carried execution error; non-envelope values pass through.
    pub fn decode_response(&self, line: &str) -> BridgeResult<Value> {
        if line.len() > self.config.max_payload_bytes {
            return Err(BridgeError::codec(
                CodecPhase::Decode,
                CodecValue::Payload,
                format!(
                    "response payload is {} bytes, exceeding the {}-byte cap",
                    line.len(),
                    self.config.max_payload_bytes
                ),
                None,
            ));
        }
        let value: Value = serde_json::from_str(line).map_err(|err| {
            BridgeError::protocol(format!("response line is not valid JSON: {err}"))
        })?;

        let object = match value {
            Value::Object(object) => object,
            other => return Ok(other),
        };

        // An envelope is identified by a numeric id.
        if object.get("id").map_or(false, Value::is_number) {
            return self.decode_envelope(&object);
        }

        // Legacy bare-error shape.
        if let Some(error) = object.get("error") {
            return Err(self.execution_error(error, "error")?);
        }

        Ok(Value::Object(object))
    }

    fn decode_envelope(&self, object: &Map<String, Value>) -> BridgeResult<Value> {
        if let Some(tag) = object.get("protocol") {
            match tag.as_str() {
                Some(tag) if tag == PROTOCOL_VERSION => {}
                Some(tag) => {
                    return Err(BridgeError::protocol(format!(
                        "protocol version mismatch: expected \"{PROTOCOL_VERSION}\", got \"{tag}\""
                    )));
                }
                None => {
                    return Err(BridgeError::protocol(
                        "envelope field \"protocol\" must be a string",
                    ));
                }
            }
        }

        match (object.get("result"), object.get("error")) {
            (Some(_), Some(_)) => Err(BridgeError::protocol(
                "envelope carries both \"result\" and \"error\"; exactly one is allowed",
            )),
            (None, None) => Err(BridgeError::protocol(
                "envelope carries neither \"result\" nor \"error\"; exactly one is required",
            )),
            (Some(result), None) => Ok(result.clone()),
            (None, Some(error)) => Err(self.execution_error(error, "error")?),
        }
    }

    /// Parses an error payload into an execution error, or explains why the
    /// payload is malformed (a protocol error).
    fn execution_error(&self, error: &Value, path: &str) -> BridgeResult<BridgeError> {
        if let Value::String(message) = error {
            return Ok(BridgeError::execution("Error", message.clone(), None));
        }
        let Some(object) = error.as_object() else {
            return Err(BridgeError::protocol(format!(
                "{path} must be an object with string \"type\" and \"message\", got {}",
                value_kind(error)
            )));
        };
        let exc_type = match object.get("type") {
            Some(Value::String(t)) => t.clone(),
            Some(other) => {
                return Err(BridgeError::protocol(format!(
                    "{path}.type must be a string, got {}",
                    value_kind(other)
                )));
            }
            None => {
                return Err(BridgeError::protocol(format!(
                    "{path}.type is missing; an error payload requires a string type"
                )));
            }
        };
        let message = match object.get("message") {
            Some(Value::String(m)) => m.clone(),
            Some(other) => {
                return Err(BridgeError::protocol(format!(
                    "{path}.message must be a string, got {}",
                    value_kind(other)
                )));
            }
            None => {
                return Err(BridgeError::protocol(format!(
                    "{path}.message is missing; an error payload requires a string message"
                )));
            }
        };
        let traceback = match object.get("traceback") {
            None | Some(Value::Null) => None,
            Some(Value::String(t)) => Some(t.clone()),
            Some(other) => {
                return Err(BridgeError::protocol(format!(
                    "{path}.traceback must be a string when present, got {}",
                    value_kind(other)
                )));
            }
        };
        Ok(BridgeError::execution(exc_type, message, traceback))
    }

    /// Decodes a response and expands wire wrappers (bytes, ndarray,
    /// split-orientation tabular payloads). Non-finite scanning happens on
    /// the pre-decode value; expanded values are not re-validated.
    pub fn decode_response_deep(&self, line: &str) -> BridgeResult<PayloadValue> {
        let value = self.decode_response(line)?;
        self.expand(value)
    }

    fn expand(&self, value: Value) -> BridgeResult<PayloadValue> {
        match value {
            Value::Object(map) => {
                if map.get(BYTES_SENTINEL).and_then(Value::as_bool) == Some(true) {
                    let encoded = map.get("b64").and_then(Value::as_str).ok_or_else(|| {
                        BridgeError::codec(
                            CodecPhase::Decode,
                            CodecValue::Bytes,
                            "bytes wrapper is missing a string \"b64\" field",
                            None,
                        )
                    })?;
                    let decoded = BASE64.decode(encoded).map_err(|err| {
                        BridgeError::codec(
                            CodecPhase::Decode,
                            CodecValue::Bytes,
                            format!("bytes wrapper carries invalid base64: {err}"),
                            None,
                        )
                    })?;
                    return Ok(PayloadValue::Bytes(decoded));
                }
                if map.get(NDARRAY_SENTINEL).and_then(Value::as_bool) == Some(true) {
                    return self.expand_ndarray(map);
                }
                if map.get(DATAFRAME_SENTINEL).and_then(Value::as_bool) == Some(true) {
                    return self.expand_dataframe(&map);
                }
                let mut out = IndexMap::new();
                for (key, item) in map {
                    out.insert(key, self.expand(item)?);
                }
                Ok(PayloadValue::Object(out))
            }
            Value::Array(items) => Ok(PayloadValue::Array(
                items
                    .into_iter()
                    .map(|item| self.expand(item))
                    .collect::<BridgeResult<_>>()?,
            )),
            other => Ok(PayloadValue::from_json(other)),
        }
    }

    fn expand_ndarray(&self, mut map: Map<String, Value>) -> BridgeResult<PayloadValue> {
        map.remove(NDARRAY_SENTINEL);
        let mut out = IndexMap::new();
        for field in ["dtype", "shape"] {
            if let Some(value) = map.remove(field) {
                out.insert(field.to_string(), PayloadValue::from_json(value));
            }
        }
        match map.remove("data") {
            Some(Value::String(encoded)) => {
                let decoded = BASE64.decode(encoded.as_bytes()).map_err(|err| {
                    BridgeError::codec(
                        CodecPhase::Decode,
                        CodecValue::Arrow,
                        format!("ndarray data carries invalid base64: {err}"),
                        None,
                    )
                })?;
                out.insert("data".to_string(), PayloadValue::Bytes(decoded));
            }
            Some(other) => {
                out.insert("data".to_string(), PayloadValue::from_json(other));
            }
            None => {
                return Err(BridgeError::codec(
                    CodecPhase::Decode,
                    CodecValue::Arrow,
                    "ndarray wrapper is missing its \"data\" field",
                    None,
                ));
            }
        }
        Ok(PayloadValue::Object(out))
    }

    /// Split orientation (`columns` + row-major `data`) becomes an array of
    /// row objects.
    fn expand_dataframe(&self, map: &Map<String, Value>) -> BridgeResult<PayloadValue> {
        let columns: Vec<String> = map
            .get("columns")
            .and_then(Value::as_array)
            .map(|cols| {
                cols.iter()
                    .map(|c| c.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .ok_or_else(|| {
                BridgeError::codec(
                    CodecPhase::Decode,
                    CodecValue::Arrow,
                    "tabular wrapper is missing its \"columns\" array",
                    None,
                )
            })?;
        let rows = map.get("data").and_then(Value::as_array).ok_or_else(|| {
            BridgeError::codec(
                CodecPhase::Decode,
                CodecValue::Arrow,
                "tabular wrapper is missing its \"data\" array",
                None,
            )
        })?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = IndexMap::new();
            if let Some(cells) = row.as_array() {
                for (column, cell) in columns.iter().zip(cells) {
                    record.insert(column.clone(), PayloadValue::from_json(cell.clone()));
                }
            }
            out.push(PayloadValue::Object(record));
        }
        Ok(PayloadValue::Array(out))
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> Codec {
        Codec::default()
    }

    fn simple_call(args: Vec<PayloadValue>) -> Request {
        Request::call(1, "math", "sqrt", args, None)
    }

    #[test]
    fn test_encode_basic_request_shape() {
        let line = codec()
            .encode_request(&simple_call(vec![PayloadValue::Int(16)]))
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["protocol"], PROTOCOL_VERSION);
        assert_eq!(value["method"], "call");
        assert_eq!(value["params"]["module"], "math");
        assert_eq!(value["params"]["functionName"], "sqrt");
        assert_eq!(value["params"]["args"], json!([16]));
        assert!(value["params"].get("kwargs").is_none());
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_nan_rejected_with_path() {
        let err = codec()
            .encode_request(&simple_call(vec![PayloadValue::Float(f64::NAN)]))
            .unwrap_err();
        match err {
            BridgeError::Codec {
                phase: CodecPhase::Encode,
                value: CodecValue::Number,
                path,
                ..
            } => assert_eq!(path.as_deref(), Some("args[0]")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_nan_path_reporting() {
        let nested = PayloadValue::Object(
            [(
                "a".to_string(),
                PayloadValue::Object(
                    [(
                        "b".to_string(),
                        PayloadValue::Array(vec![
                            PayloadValue::Int(0),
                            PayloadValue::Int(1),
                            PayloadValue::Object(
                                [("c".to_string(), PayloadValue::Float(f64::INFINITY))]
                                    .into_iter()
                                    .collect(),
                            ),
                        ]),
                    )]
                    .into_iter()
                    .collect(),
                ),
            )]
            .into_iter()
            .collect(),
        );
        let err = codec()
            .encode_request(&simple_call(vec![nested]))
            .unwrap_err();
        assert!(err.to_string().contains("args[0].a.b[2].c"), "{err}");
    }

    #[test]
    fn test_non_string_map_keys_rejected() {
        let map = PayloadValue::Map(vec![(PayloadValue::Int(1), PayloadValue::Str("x".into()))]);
        let err = codec().encode_request(&simple_call(vec![map])).unwrap_err();
        match err {
            BridgeError::Codec {
                value: CodecValue::Json,
                path,
                ..
            } => assert_eq!(path.as_deref(), Some("args[0]")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_string_keyed_map_encodes_as_object() {
        let map = PayloadValue::Map(vec![(
            PayloadValue::Str("k".into()),
            PayloadValue::Int(7),
        )]);
        let line = codec().encode_request(&simple_call(vec![map])).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["params"]["args"][0], json!({"k": 7}));
    }

    #[test]
    fn test_bytes_policy_base64_wraps() {
        let line = codec()
            .encode_request(&simple_call(vec![PayloadValue::Bytes(vec![1, 2, 3])]))
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        let wrapped = &value["params"]["args"][0];
        assert_eq!(wrapped[BYTES_SENTINEL], true);
        assert_eq!(wrapped["b64"], BASE64.encode([1, 2, 3]));
    }

    #[test]
    fn test_bytes_policy_reject() {
        let codec = Codec::new(CodecConfig {
            bytes: BytesPolicy::Reject,
            ..CodecConfig::default()
        });
        let err = codec
            .encode_request(&simple_call(vec![PayloadValue::Bytes(vec![0])]))
            .unwrap_err();
        match err {
            BridgeError::Codec {
                value: CodecValue::Bytes,
                path,
                ..
            } => assert_eq!(path.as_deref(), Some("args[0]")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bytes_policy_passthrough() {
        let codec = Codec::new(CodecConfig {
            bytes: BytesPolicy::Passthrough,
            ..CodecConfig::default()
        });
        let line = codec
            .encode_request(&simple_call(vec![PayloadValue::Bytes(vec![9, 8])]))
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["params"]["args"][0], json!([9, 8]));
    }

    #[test]
    fn test_payload_cap_enforced_on_encode() {
        let codec = Codec::new(CodecConfig {
            max_payload_bytes: 64,
            ..CodecConfig::default()
        });
        let big = PayloadValue::Str("x".repeat(256));
        let err = codec.encode_request(&simple_call(vec![big])).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Codec {
                phase: CodecPhase::Encode,
                value: CodecValue::Payload,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_result_envelope() {
        let value = codec()
            .decode_response(r#"{"id":1,"result":4}"#)
            .unwrap();
        assert_eq!(value, json!(4));
    }

    #[test]
    fn test_decode_execution_error_preserves_identity() {
        let err = codec()
            .decode_response(r#"{"id":1,"error":{"type":"ValueError","message":"bad","traceback":"Traceback..."}}"#)
            .unwrap_err();
        match err {
            BridgeError::Execution {
                exc_type,
                message,
                traceback,
                ..
            } => {
                assert_eq!(exc_type, "ValueError");
                assert_eq!(message, "bad");
                assert_eq!(traceback.as_deref(), Some("Traceback..."));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_both_result_and_error_is_protocol_error() {
        let err = codec()
            .decode_response(r#"{"id":1,"result":1,"error":{"type":"E","message":"m"}}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_neither_result_nor_error_is_protocol_error() {
        let err = codec().decode_response(r#"{"id":1}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }

    #[test]
    fn test_malformed_error_payload_explains_why() {
        let err = codec()
            .decode_response(r#"{"id":1,"error":{"type":42,"message":"m"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("error.type"), "{err}");
        assert!(err.to_string().contains("number"), "{err}");
    }

    #[test]
    fn test_protocol_tag_mismatch() {
        let err = codec()
            .decode_response(r#"{"id":1,"protocol":"other/9","result":1}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
        assert!(err.to_string().contains("other/9"));
    }

    #[test]
    fn test_missing_protocol_tag_is_accepted() {
        let value = codec()
            .decode_response(r#"{"id":7,"result":"ok"}"#)
            .unwrap();
        assert_eq!(value, json!("ok"));
    }

    #[test]
    fn test_non_envelope_passes_through() {
        let value = codec().decode_response(r#"{"rows":[1,2,3]}"#).unwrap();
        assert_eq!(value, json!({"rows": [1, 2, 3]}));
        let scalar = codec().decode_response("42").unwrap();
        assert_eq!(scalar, json!(42));
    }

    #[test]
    fn test_legacy_bare_error_shape() {
        let err = codec()
            .decode_response(r#"{"error":{"type":"KeyError","message":"missing"}}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution { .. }));
    }

    #[test]
    fn test_non_json_line_is_protocol_error() {
        let err = codec().decode_response("not json at all").unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }

    #[test]
    fn test_round_trip_clean_payload() {
        let args = vec![
            PayloadValue::Int(1),
            PayloadValue::Float(2.5),
            PayloadValue::Str("three".into()),
            PayloadValue::Array(vec![PayloadValue::Bool(true), PayloadValue::Null]),
        ];
        let line = codec().encode_request(&simple_call(args)).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value["params"]["args"],
            json!([1, 2.5, "three", [true, null]])
        );
    }

    #[test]
    fn test_deep_decode_bytes_wrapper() {
        let encoded = BASE64.encode([1, 2, 3]);
        let line = format!(
            r#"{{"id":1,"result":{{"{BYTES_SENTINEL}":true,"b64":"{encoded}"}}}}"#
        );
        let value = codec().decode_response_deep(&line).unwrap();
        assert_eq!(value, PayloadValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_deep_decode_dataframe_split_orientation() {
        let line = format!(
            r#"{{"id":1,"result":{{"{DATAFRAME_SENTINEL}":true,"columns":["a","b"],"data":[[1,2],[3,4]]}}}}"#
        );
        let value = codec().decode_response_deep(&line).unwrap();
        match value {
            PayloadValue::Array(rows) => {
                assert_eq!(rows.len(), 2);
                match &rows[0] {
                    PayloadValue::Object(row) => {
                        assert_eq!(row.get("a"), Some(&PayloadValue::Int(1)));
                        assert_eq!(row.get("b"), Some(&PayloadValue::Int(2)));
                    }
                    other => panic!("expected row object, got {other:?}"),
                }
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn test_deep_decode_ndarray_wrapper() {
        let line = format!(
            r#"{{"id":1,"result":{{"{NDARRAY_SENTINEL}":true,"dtype":"float64","shape":[2],"data":[1.0,2.0]}}}}"#
        );
        let value = codec().decode_response_deep(&line).unwrap();
        match value {
            PayloadValue::Object(fields) => {
                assert_eq!(
                    fields.get("dtype"),
                    Some(&PayloadValue::Str("float64".into()))
                );
                assert!(matches!(fields.get("data"), Some(PayloadValue::Array(_))));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_cap_symmetric() {
        let codec = Codec::new(CodecConfig {
            max_payload_bytes: 8,
            ..CodecConfig::default()
        });
        let err = codec
            .decode_response(r#"{"id":1,"result":"aaaaaaaa"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Codec {
                phase: CodecPhase::Decode,
                value: CodecValue::Payload,
                ..
            }
        ));
    }
}
