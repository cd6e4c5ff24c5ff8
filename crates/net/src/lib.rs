//! Remote-call core of the tablet manager client.
//!
//! Provides:
//! - `CallContext`: deadline plus cancellation for one call
//! - `deadline`: absolute deadline to connect timeout, checked before dialing
//! - `Dialer` / `Connection`: the transport seam, with `GrpcDialer` (tonic),
//!   `MockDialer` (in-memory, behind the `test-util` feature) and
//!   `ChaosDialer` (fault injection)
//! - `invoke`: a unary call raced against the context
//! - `forward` / `StreamCompletion`: a streaming call relayed through a
//!   bounded channel by a background task
//! - `TabletManagerClient`: every tablet manager operation on top of the above

#![allow(clippy::result_large_err)]

pub mod chaos;
pub mod client;
pub mod context;
pub mod convert;
pub mod deadline;
pub mod forwarder;
pub mod grpc;
pub mod invoker;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod operations;
pub mod transport;

pub use chaos::{ChaosConfig, ChaosDialer};
pub use client::TabletManagerClient;
pub use context::{CallContext, DoneCause};
pub use forwarder::{forward, StreamCompletion, StreamOptions, DEFAULT_STREAM_BUFFER};
pub use grpc::{GrpcConnection, GrpcDialer};
pub use invoker::{invoke, Call};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockDialer, MockStream};
pub use operations::{DbaFetch, PING_PAYLOAD};
pub use transport::{Connection, Dialer, FrameStream};
