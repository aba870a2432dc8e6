//! # tywrap Runtime — Boundary Runtime for the Python Bridge
//!
//! Lifecycle-managed plumbing between the host and Python subprocesses:
//!
//! - [`context::BoundedContext`] — lifecycle state machine, bounded
//!   execution (timeout/retry/cancel), resource ownership
//! - [`transport::PythonTransport`] — subprocess JSONL transport with
//!   stdin backpressure, stderr capture, and restart policy
//! - [`pool::WorkerPool`] — multi-transport pool with a bounded wait queue
//! - [`protocol::ProtocolClient`] — typed `call` / `instantiate` /
//!   `call_method` / `dispose_instance` entry points
//!
//! Ownership is strict and acyclic: the pool owns transports, the protocol
//! client holds a transport reference, and the bounded context is a leaf
//! capability embedded in each component.

pub mod context;
pub mod pool;
pub mod protocol;
pub mod transport;

pub use context::{BoundedContext, ExecOptions, LifecycleState, ManagedResource};
pub use pool::{PoolConfig, PoolWorker, WorkerPool};
pub use protocol::{ProtocolClient, ProtocolConfig};
pub use transport::{PythonTransport, TransportConfig};
