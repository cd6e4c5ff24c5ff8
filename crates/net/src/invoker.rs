//! Unary invocation raced against the caller's context.

use crate::context::{CallContext, DoneCause};
use crate::transport::Connection;
use bytes::Bytes;
use prost::Message;
use tmrpc_common::{CallError, RemoteEndpoint, TimeoutError};
use tokio::time::{Duration, Instant};
use tonic::{Code, Status};

/// One outstanding request: operation name, encoded arguments and the
/// deadline in force when it was issued.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub payload: Bytes,
    pub deadline: Option<Instant>,
}

impl Call {
    pub fn new<M: Message>(method: &'static str, request: &M, ctx: &CallContext) -> Self {
        Self {
            method,
            payload: Bytes::from(request.encode_to_vec()),
            deadline: ctx.deadline(),
        }
    }

    /// Time left before the deadline, as sent to the server.
    pub fn timeout(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Issue `method` on `conn` and wait for whichever comes first: the
/// response or the end of `ctx`.
///
/// When both are ready at the same time the response wins.
pub async fn invoke<C, Req, Resp>(
    ctx: &CallContext,
    conn: &mut C,
    endpoint: &RemoteEndpoint,
    method: &'static str,
    request: &Req,
) -> Result<Resp, CallError>
where
    C: Connection,
    Req: Message,
    Resp: Message + Default,
{
    let call = Call::new(method, request, ctx);
    let timeout = call.timeout();
    tracing::debug!(
        alias = %endpoint.alias,
        method,
        bytes = call.payload.len(),
        remaining_ms = timeout.map(|t| t.as_millis() as u64),
        "invoking"
    );

    let completed = tokio::select! {
        biased;
        result = conn.unary(call.method, call.payload, timeout) => result,
        cause = ctx.done() => return Err(abandoned(cause, endpoint, method)),
    };

    match completed {
        Ok(body) => Resp::decode(body).map_err(|e| CallError::Decode {
            alias: endpoint.alias.clone(),
            method,
            message: e.to_string(),
        }),
        Err(status) if expired_in_transport(&status, ctx) => {
            Err(abandoned(DoneCause::DeadlineExceeded, endpoint, method))
        }
        Err(status) => Err(CallError::Remote {
            alias: endpoint.alias.clone(),
            method,
            message: status.message().to_string(),
        }),
    }
}

/// The channel enforces the `grpc-timeout` it sent and fails the call on
/// the same instant our deadline fires. That failure is a timeout, not a
/// remote error.
fn expired_in_transport(status: &Status, ctx: &CallContext) -> bool {
    matches!(status.code(), Code::DeadlineExceeded | Code::Cancelled)
        && ctx.cause() == Some(DoneCause::DeadlineExceeded)
}

/// The error for a wait abandoned because the context finished.
pub(crate) fn abandoned(cause: DoneCause, endpoint: &RemoteEndpoint, method: &'static str) -> CallError {
    match cause {
        DoneCause::DeadlineExceeded => CallError::Timeout(TimeoutError::new(format!(
            "timeout waiting for TabletManager.{} to {}",
            method, endpoint.alias
        ))),
        DoneCause::Canceled => CallError::Interrupted {
            alias: endpoint.alias.clone(),
            method,
        },
    }
}
