//! `TabletManagerClient`: the entry point for every tablet manager call.
//!
//! Each call translates the context deadline, dials its own connection,
//! then either invokes a unary method or hands the connection to a stream
//! forwarder. Nothing is pooled; the connection is dropped when the call
//! (or the stream task) ends.

use crate::context::CallContext;
use crate::deadline;
use crate::forwarder::{self, StreamCompletion, StreamOptions, DEFAULT_STREAM_BUFFER};
use crate::grpc::GrpcDialer;
use crate::invoker::{abandoned, invoke};
use crate::transport::{Connection, Dialer, FrameStream};
use bytes::Bytes;
use prost::Message;
use std::sync::Arc;
use tmrpc_common::{CallError, RemoteEndpoint};
use tmrpc_metrics::{metrics, record_outcome, start_call_timer, SHAPE_UNARY};
use tokio::sync::mpsc;

/// Client for the tablet manager service, generic over how connections
/// are made.
pub struct TabletManagerClient<D: Dialer = GrpcDialer> {
    dialer: Arc<D>,
    stream_buffer: usize,
}

impl<D: Dialer> Clone for TabletManagerClient<D> {
    fn clone(&self) -> Self {
        Self {
            dialer: self.dialer.clone(),
            stream_buffer: self.stream_buffer,
        }
    }
}

impl<D: Dialer> std::fmt::Debug for TabletManagerClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabletManagerClient")
            .field("stream_buffer", &self.stream_buffer)
            .finish_non_exhaustive()
    }
}

impl TabletManagerClient<GrpcDialer> {
    /// A client that dials over gRPC.
    pub fn grpc() -> Self {
        Self::new(GrpcDialer::new())
    }
}

impl<D: Dialer> TabletManagerClient<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer: Arc::new(dialer),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Channel capacity for streaming calls.
    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer;
        self
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub(crate) fn stream_options(&self) -> StreamOptions {
        StreamOptions::default().with_buffer(self.stream_buffer)
    }

    async fn dial(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        method: &'static str,
    ) -> Result<D::Conn, CallError> {
        let timeout = deadline::connect_timeout(ctx, endpoint, method)?;
        tracing::debug!(alias = %endpoint.alias, method, ?timeout, "dialing");
        self.dialer.dial(endpoint, timeout).await.map_err(|source| {
            metrics().dial_failures.with_label_values(&[method]).inc();
            CallError::Dial {
                alias: endpoint.alias.clone(),
                method,
                source,
            }
        })
    }

    /// Issue a unary call and decode its response.
    pub async fn call<Req, Resp>(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        method: &'static str,
        request: &Req,
    ) -> Result<Resp, CallError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let _timer = start_call_timer(method, SHAPE_UNARY);
        let result = async {
            let mut conn = self.dial(ctx, endpoint, method).await?;
            invoke(ctx, &mut conn, endpoint, method, request).await
        }
        .await;

        record_outcome(method, outcome_label(&result));
        if let Err(e) = &result {
            tracing::debug!(alias = %endpoint.alias, method, error = %e, "call failed");
        }
        result
    }

    /// Open a server-streaming call and relay its frames, translated by
    /// `translate`, through a bounded channel.
    pub async fn stream<Req, M, T, F>(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        method: &'static str,
        request: &Req,
        options: StreamOptions,
        translate: F,
    ) -> Result<(mpsc::Receiver<T>, StreamCompletion), CallError>
    where
        Req: Message,
        M: Message + Default + Send + 'static,
        T: Send + 'static,
        F: FnMut(M) -> T + Send + 'static,
    {
        metrics().calls_started.with_label_values(&[method]).inc();
        match self.open(ctx, endpoint, method, request).await {
            Ok((conn, frames)) => Ok(forwarder::forward(
                ctx, conn, frames, endpoint, method, options, translate,
            )),
            Err(e) => {
                record_outcome(method, e.kind().as_str());
                tracing::debug!(alias = %endpoint.alias, method, error = %e, "stream open failed");
                Err(e)
            }
        }
    }

    async fn open<Req: Message>(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        method: &'static str,
        request: &Req,
    ) -> Result<(D::Conn, FrameStream), CallError> {
        let mut conn = self.dial(ctx, endpoint, method).await?;
        let payload = Bytes::from(request.encode_to_vec());
        let opened = tokio::select! {
            biased;
            opened = conn.server_streaming(method, payload, ctx.remaining()) => opened,
            cause = ctx.done() => return Err(abandoned(cause, endpoint, method)),
        };
        let frames = opened.map_err(|status| CallError::Remote {
            alias: endpoint.alias.clone(),
            method,
            message: status.message().to_string(),
        })?;
        Ok((conn, frames))
    }
}

/// Metrics label for a finished call.
pub fn outcome_label<T>(result: &Result<T, CallError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    }
}
