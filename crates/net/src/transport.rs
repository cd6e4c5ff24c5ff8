//! Transport abstraction: how a call reaches a tablet manager.
//!
//! Implementations:
//! - [`GrpcDialer`](crate::grpc::GrpcDialer) for real deployments (tonic over HTTP/2)
//! - `MockDialer` for in-process tests (`test-util` feature)
//! - [`ChaosDialer`](crate::chaos::ChaosDialer) to inject faults around either
//!
//! Payloads cross this boundary as encoded bytes; encoding and decoding
//! happen in the invoker and stream forwarder.

use bytes::Bytes;
use futures::stream::BoxStream;
use tmrpc_common::{DialError, RemoteEndpoint};
use tokio::time::Duration;
use tonic::Status;

/// Frames of a server-streaming call, ending with `None` on clean end-of-stream.
pub type FrameStream = BoxStream<'static, Result<Bytes, Status>>;

/// One established connection, owned by exactly one call.
///
/// Dropping the connection releases it.
#[async_trait::async_trait]
pub trait Connection: Send + 'static {
    /// Send one request and await its single response.
    ///
    /// `timeout` is the time left on the caller's deadline. It travels with
    /// the request so the server can stop work the caller will not wait for.
    async fn unary(
        &mut self,
        method: &'static str,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Bytes, Status>;

    /// Send one request and return the stream of response frames.
    async fn server_streaming(
        &mut self,
        method: &'static str,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<FrameStream, Status>;
}

/// Establishes connections to tablet managers.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Conn: Connection;

    /// Connect to `endpoint`, giving up after `timeout` if one is set.
    async fn dial(
        &self,
        endpoint: &RemoteEndpoint,
        timeout: Option<Duration>,
    ) -> Result<Self::Conn, DialError>;
}
