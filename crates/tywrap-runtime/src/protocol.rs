//! Protocol client: request correlation over a transport.
//!
//! Generates monotonic unique ids, encodes one envelope per operation,
//! sends it through the owned transport reference, and decodes the
//! correlated response. Delivery is at-most-once per id; ordering across
//! concurrent callers is not promised.

use crate::context::{validate_non_empty_string, BoundedContext};
use crate::transport::PythonTransport;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tywrap_core::codec::{Codec, CodecConfig, PayloadValue, Request};
use tywrap_core::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub default_timeout: Duration,
    pub codec: CodecConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            codec: CodecConfig::default(),
        }
    }
}

/// Typed entry points over one transport.
///
/// The client holds a transport *reference*; whoever created the transport
/// (usually the pool) owns its lifetime. Disposing the client stops new
/// requests without tearing the subprocess down.
pub struct ProtocolClient {
    transport: Arc<PythonTransport>,
    codec: Codec,
    ctx: BoundedContext,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl ProtocolClient {
    pub fn new(transport: Arc<PythonTransport>, config: ProtocolConfig) -> Self {
        Self {
            transport,
            codec: Codec::new(config.codec),
            ctx: BoundedContext::new("protocol-client"),
            next_id: AtomicU64::new(0),
            default_timeout: config.default_timeout,
        }
    }

    pub fn context(&self) -> &BoundedContext {
        &self.ctx
    }

    /// Next request id: positive, unique, monotonic per client instance.
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn init(&self) -> BridgeResult<()> {
        self.ctx.init(|| async { Ok(()) }).await?;
        self.transport.init().await
    }

    pub async fn dispose(&self) -> BridgeResult<()> {
        self.ctx.dispose(|| async { Ok(()) }).await
    }

    /// Encodes, sends, and decodes one request envelope.
    pub async fn request(
        &self,
        request: Request,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<Value> {
        if self.ctx.is_disposed_like() {
            return Err(BridgeError::disposed("protocol client has been disposed"));
        }
        let line = self.codec.encode_request(&request)?;
        debug!(id = request.id, method = request.params.method().as_str(), "bridge request");
        let response = self.transport.send(&line, timeout, cancel).await?;
        self.codec.decode_response(&response)
    }

    /// Calls a module-level function.
    pub async fn call(
        &self,
        module: &str,
        function: &str,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> BridgeResult<Value> {
        validate_non_empty_string("module", module)?;
        validate_non_empty_string("function", function)?;
        let request = Request::call(self.next_id(), module, function, args, kwargs);
        self.request(request, self.default_timeout, None).await
    }

    /// Like [`Self::call`], expanding wire wrappers (bytes, ndarray,
    /// tabular) in the result.
    pub async fn call_deep(
        &self,
        module: &str,
        function: &str,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> BridgeResult<PayloadValue> {
        validate_non_empty_string("module", module)?;
        validate_non_empty_string("function", function)?;
        let request = Request::call(self.next_id(), module, function, args, kwargs);
        if self.ctx.is_disposed_like() {
            return Err(BridgeError::disposed("protocol client has been disposed"));
        }
        let line = self.codec.encode_request(&request)?;
        let response = self
            .transport
            .send(&line, self.default_timeout, None)
            .await?;
        self.codec.decode_response_deep(&response)
    }

    /// Instantiates a class, returning the opaque instance handle.
    pub async fn instantiate(
        &self,
        module: &str,
        class_name: &str,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> BridgeResult<String> {
        validate_non_empty_string("module", module)?;
        validate_non_empty_string("class", class_name)?;
        let request = Request::instantiate(self.next_id(), module, class_name, args, kwargs);
        let result = self.request(request, self.default_timeout, None).await?;
        match result {
            Value::String(handle) => Ok(handle),
            other => Err(BridgeError::protocol(format!(
                "instantiate must return a string handle, got {other}"
            ))),
        }
    }

    /// Calls a method on a handle obtained from [`Self::instantiate`].
    pub async fn call_method(
        &self,
        handle: &str,
        method: &str,
        args: Vec<PayloadValue>,
        kwargs: Option<IndexMap<String, PayloadValue>>,
    ) -> BridgeResult<Value> {
        validate_non_empty_string("handle", handle)?;
        validate_non_empty_string("method", method)?;
        let request = Request::call_method(self.next_id(), handle, method, args, kwargs);
        self.request(request, self.default_timeout, None).await
    }

    /// Releases the Python-side instance behind a handle.
    pub async fn dispose_instance(&self, handle: &str) -> BridgeResult<()> {
        validate_non_empty_string("handle", handle)?;
        let request = Request::dispose_instance(self.next_id(), handle);
        self.request(request, self.default_timeout, None).await?;
        Ok(())
    }
}
