//! gRPC transport over tonic.
//!
//! `GrpcDialer` opens a fresh tonic `Channel` per call; there is no pool.
//! `GrpcConnection` wraps the generated `TabletManagerClient` and maps the
//! byte-level [`Connection`] calls onto its typed methods by name.

use crate::transport::{Connection, Dialer, FrameStream};
use bytes::Bytes;
use futures::StreamExt;
use prost::Message;
use tmrpc_common::{DialError, RemoteEndpoint};
use tmrpc_proto::tabletmanagerdata as pb;
use tmrpc_proto::tabletmanagerservice::tablet_manager_client::TabletManagerClient;
use tokio::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

// ---------------------------------------------------------------------------
// Dialer
// ---------------------------------------------------------------------------

/// Dials tablet managers over gRPC, one connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcDialer;

impl GrpcDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Dialer for GrpcDialer {
    type Conn = GrpcConnection;

    async fn dial(
        &self,
        endpoint: &RemoteEndpoint,
        timeout: Option<Duration>,
    ) -> Result<GrpcConnection, DialError> {
        let addr = endpoint.addr.clone();
        let mut target =
            Endpoint::from_shared(endpoint.uri()).map_err(|e| DialError::InvalidAddress {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let connected = match timeout {
            Some(timeout) => {
                target = target.connect_timeout(timeout);
                // connect_timeout only bounds the TCP handshake; bound HTTP/2 setup too.
                tokio::time::timeout(timeout, target.connect())
                    .await
                    .map_err(|_| DialError::TimedOut {
                        addr: addr.clone(),
                        timeout,
                    })?
            }
            None => target.connect().await,
        };

        let channel = connected.map_err(|e| DialError::Connect {
            addr: addr.clone(),
            reason: error_chain(&e),
        })?;

        tracing::debug!(alias = %endpoint.alias, %addr, "connected");
        Ok(GrpcConnection::new(channel))
    }
}

/// Render an error with its sources; tonic's top-level message alone is
/// just "transport error".
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A connected tablet manager client. Dropping it closes the channel.
#[derive(Debug)]
pub struct GrpcConnection {
    client: TabletManagerClient<Channel>,
}

impl GrpcConnection {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: TabletManagerClient::new(channel),
        }
    }
}

/// Decode `body` into a typed request carrying the caller's remaining
/// time as `grpc-timeout`.
fn request<M: Message + Default>(
    body: Bytes,
    timeout: Option<Duration>,
) -> Result<tonic::Request<M>, Status> {
    let message = M::decode(body)
        .map_err(|e| Status::invalid_argument(format!("malformed request: {}", e)))?;
    let mut request = tonic::Request::new(message);
    if let Some(timeout) = timeout {
        request.set_timeout(timeout);
    }
    Ok(request)
}

fn encode<M: Message>(message: M) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

fn unknown_method(method: &str) -> Status {
    Status::unimplemented(format!("TabletManager has no method {}", method))
}

/// Expands to the name-to-method dispatch for both call shapes.
macro_rules! dispatch {
    (
        unary { $($name:literal => $rpc:ident($req:ty),)* }
        streaming { $($s_name:literal => $s_rpc:ident($s_req:ty),)* }
    ) => {
        /// Unary methods the gRPC transport can dispatch.
        pub const UNARY_METHODS: &[&str] = &[$($name),*];

        /// Server-streaming methods the gRPC transport can dispatch.
        pub const STREAMING_METHODS: &[&str] = &[$($s_name),*];

        impl GrpcConnection {
            async fn call_unary(
                &mut self,
                method: &str,
                body: Bytes,
                timeout: Option<Duration>,
            ) -> Result<Bytes, Status> {
                match method {
                    $($name => {
                        let request = request::<$req>(body, timeout)?;
                        let response = self.client.$rpc(request).await?;
                        Ok(encode(response.into_inner()))
                    })*
                    other => Err(unknown_method(other)),
                }
            }

            async fn call_streaming(
                &mut self,
                method: &str,
                body: Bytes,
                timeout: Option<Duration>,
            ) -> Result<FrameStream, Status> {
                match method {
                    $($s_name => {
                        let request = request::<$s_req>(body, timeout)?;
                        let response = self.client.$s_rpc(request).await?;
                        Ok(response
                            .into_inner()
                            .map(|frame| frame.map(encode))
                            .boxed())
                    })*
                    other => Err(unknown_method(other)),
                }
            }
        }
    };
}

dispatch! {
    unary {
        "Ping" => ping(pb::PingRequest),
        "Sleep" => sleep(pb::SleepRequest),
        "ExecuteHook" => execute_hook(pb::ExecuteHookRequest),
        "GetSchema" => get_schema(pb::GetSchemaRequest),
        "GetPermissions" => get_permissions(pb::GetPermissionsRequest),
        "SetReadOnly" => set_read_only(pb::SetReadOnlyRequest),
        "SetReadWrite" => set_read_write(pb::SetReadWriteRequest),
        "ChangeType" => change_type(pb::ChangeTypeRequest),
        "Scrap" => scrap(pb::ScrapRequest),
        "RefreshState" => refresh_state(pb::RefreshStateRequest),
        "RunHealthCheck" => run_health_check(pb::RunHealthCheckRequest),
        "ReloadSchema" => reload_schema(pb::ReloadSchemaRequest),
        "PreflightSchema" => preflight_schema(pb::PreflightSchemaRequest),
        "ApplySchema" => apply_schema(pb::ApplySchemaRequest),
        "ExecuteFetchAsDba" => execute_fetch_as_dba(pb::ExecuteFetchAsDbaRequest),
        "ExecuteFetchAsApp" => execute_fetch_as_app(pb::ExecuteFetchAsAppRequest),
        "ReplicationStatus" => replication_status(pb::ReplicationStatusRequest),
        "PrimaryPosition" => primary_position(pb::PrimaryPositionRequest),
        "StopReplication" => stop_replication(pb::StopReplicationRequest),
        "StopReplicationMinimum" => stop_replication_minimum(pb::StopReplicationMinimumRequest),
        "StartReplication" => start_replication(pb::StartReplicationRequest),
        "TabletExternallyReparented" => tablet_externally_reparented(pb::TabletExternallyReparentedRequest),
        "GetReplicas" => get_replicas(pb::GetReplicasRequest),
        "WaitBlpPosition" => wait_blp_position(pb::WaitBlpPositionRequest),
        "StopBlp" => stop_blp(pb::StopBlpRequest),
        "StartBlp" => start_blp(pb::StartBlpRequest),
        "RunBlpUntil" => run_blp_until(pb::RunBlpUntilRequest),
        "ResetReplication" => reset_replication(pb::ResetReplicationRequest),
        "InitPrimary" => init_primary(pb::InitPrimaryRequest),
        "PopulateReparentJournal" => populate_reparent_journal(pb::PopulateReparentJournalRequest),
        "InitReplica" => init_replica(pb::InitReplicaRequest),
        "DemotePrimary" => demote_primary(pb::DemotePrimaryRequest),
        "PromoteReplicaWhenCaughtUp" => promote_replica_when_caught_up(pb::PromoteReplicaWhenCaughtUpRequest),
        "ReplicaWasPromoted" => replica_was_promoted(pb::ReplicaWasPromotedRequest),
        "SetPrimary" => set_primary(pb::SetPrimaryRequest),
        "ReplicaWasRestarted" => replica_was_restarted(pb::ReplicaWasRestartedRequest),
        "StopReplicationAndGetStatus" => stop_replication_and_get_status(pb::StopReplicationAndGetStatusRequest),
        "PromoteReplica" => promote_replica(pb::PromoteReplicaRequest),
    }
    streaming {
        "StreamHealth" => stream_health(pb::StreamHealthRequest),
        "Backup" => backup(pb::BackupRequest),
    }
}

#[async_trait::async_trait]
impl Connection for GrpcConnection {
    async fn unary(
        &mut self,
        method: &'static str,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Bytes, Status> {
        self.call_unary(method, request, timeout).await
    }

    async fn server_streaming(
        &mut self,
        method: &'static str,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<FrameStream, Status> {
        self.call_streaming(method, request, timeout).await
    }
}
