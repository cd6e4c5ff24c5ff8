//! Tablet manager operations.
//!
//! Thin wrappers over [`TabletManagerClient::call`] and
//! [`TabletManagerClient::stream`]: each picks a method name, builds the
//! request and converts the response to domain types.

use crate::client::TabletManagerClient;
use crate::context::CallContext;
use crate::convert;
use crate::deadline::{duration_to_nanos, wait_timeout_nanos};
use crate::forwarder::StreamCompletion;
use crate::transport::Dialer;
use std::time::Duration;
use tmrpc_common::types::{
    BlpPosition, HealthStreamReply, Hook, HookResult, LoggerEvent, Permissions, QueryResult,
    ReplicationPosition, ReplicationStatus, SchemaChange, SchemaChangeResult, SchemaDefinition,
};
use tmrpc_common::{CallError, RemoteEndpoint, TabletAlias, TabletType};
use tmrpc_proto::tabletmanagerdata as pb;
use tokio::sync::mpsc;

/// Payload sent by [`TabletManagerClient::ping`] and expected back.
pub const PING_PAYLOAD: &str = "payload";

/// Arguments of [`TabletManagerClient::execute_fetch_as_dba`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbaFetch {
    pub query: String,
    pub db_name: String,
    pub max_rows: u64,
    pub want_fields: bool,
    pub disable_binlogs: bool,
    pub reload_schema: bool,
}

impl DbaFetch {
    pub fn new(query: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            db_name: db_name.into(),
            ..Default::default()
        }
    }
}

fn position(resp: pb::PositionResponse) -> ReplicationPosition {
    ReplicationPosition::new(resp.position)
}

impl<D: Dialer> TabletManagerClient<D> {
    // ---------------------------------------------------------------------
    // Read-only
    // ---------------------------------------------------------------------

    /// Round-trip a fixed payload; fails if the agent does not echo it.
    pub async fn ping(&self, ctx: &CallContext, endpoint: &RemoteEndpoint) -> Result<(), CallError> {
        let req = pb::PingRequest {
            payload: PING_PAYLOAD.to_string(),
        };
        let resp: pb::PingResponse = self.call(ctx, endpoint, "Ping", &req).await?;
        if resp.payload != PING_PAYLOAD {
            return Err(CallError::UnexpectedResponse {
                alias: endpoint.alias.clone(),
                method: "Ping",
                message: format!("bad ping result: {}", resp.payload),
            });
        }
        Ok(())
    }

    /// Make the agent sleep for `duration`. Used to test timeouts end to end.
    pub async fn sleep(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        duration: Duration,
    ) -> Result<(), CallError> {
        let req = pb::SleepRequest {
            duration: duration_to_nanos(duration),
        };
        let _: pb::SleepResponse = self.call(ctx, endpoint, "Sleep", &req).await?;
        Ok(())
    }

    pub async fn execute_hook(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        hook: &Hook,
    ) -> Result<HookResult, CallError> {
        let req = convert::hook_to_proto(hook);
        let resp: pb::ExecuteHookResponse = self.call(ctx, endpoint, "ExecuteHook", &req).await?;
        Ok(convert::hook_result_from_proto(resp))
    }

    pub async fn get_schema(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        tables: &[String],
        exclude_tables: &[String],
        include_views: bool,
    ) -> Result<SchemaDefinition, CallError> {
        let req = pb::GetSchemaRequest {
            tables: tables.to_vec(),
            include_views,
            exclude_tables: exclude_tables.to_vec(),
        };
        let resp: pb::GetSchemaResponse = self.call(ctx, endpoint, "GetSchema", &req).await?;
        Ok(resp
            .schema_definition
            .map(convert::schema_from_proto)
            .unwrap_or_default())
    }

    pub async fn get_permissions(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<Permissions, CallError> {
        let resp: pb::GetPermissionsResponse = self
            .call(ctx, endpoint, "GetPermissions", &pb::GetPermissionsRequest {})
            .await?;
        Ok(resp
            .permissions
            .map(convert::permissions_from_proto)
            .unwrap_or_default())
    }

    // ---------------------------------------------------------------------
    // Read-write
    // ---------------------------------------------------------------------

    pub async fn set_read_only(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::SetReadOnlyResponse = self
            .call(ctx, endpoint, "SetReadOnly", &pb::SetReadOnlyRequest {})
            .await?;
        Ok(())
    }

    pub async fn set_read_write(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::SetReadWriteResponse = self
            .call(ctx, endpoint, "SetReadWrite", &pb::SetReadWriteRequest {})
            .await?;
        Ok(())
    }

    pub async fn change_type(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        tablet_type: TabletType,
    ) -> Result<(), CallError> {
        let req = pb::ChangeTypeRequest {
            tablet_type: convert::tablet_type_to_proto(tablet_type),
        };
        let _: pb::ChangeTypeResponse = self.call(ctx, endpoint, "ChangeType", &req).await?;
        Ok(())
    }

    /// Take the tablet out of service for good; it becomes `SCRAP`.
    pub async fn scrap(&self, ctx: &CallContext, endpoint: &RemoteEndpoint) -> Result<(), CallError> {
        let _: pb::ScrapResponse = self
            .call(ctx, endpoint, "Scrap", &pb::ScrapRequest {})
            .await?;
        Ok(())
    }

    pub async fn refresh_state(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::RefreshStateResponse = self
            .call(ctx, endpoint, "RefreshState", &pb::RefreshStateRequest {})
            .await?;
        Ok(())
    }

    pub async fn run_health_check(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        target_type: TabletType,
    ) -> Result<(), CallError> {
        let req = pb::RunHealthCheckRequest {
            tablet_type: convert::tablet_type_to_proto(target_type),
        };
        let _: pb::RunHealthCheckResponse =
            self.call(ctx, endpoint, "RunHealthCheck", &req).await?;
        Ok(())
    }

    pub async fn reload_schema(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::ReloadSchemaResponse = self
            .call(ctx, endpoint, "ReloadSchema", &pb::ReloadSchemaRequest {})
            .await?;
        Ok(())
    }

    /// Apply `change` to a scratch copy of the schema and report the result.
    pub async fn preflight_schema(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        change: &str,
    ) -> Result<SchemaChangeResult, CallError> {
        let req = pb::PreflightSchemaRequest {
            change: change.to_string(),
        };
        let resp: pb::PreflightSchemaResponse =
            self.call(ctx, endpoint, "PreflightSchema", &req).await?;
        Ok(convert::schema_change_result(
            resp.before_schema,
            resp.after_schema,
        ))
    }

    pub async fn apply_schema(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        change: &SchemaChange,
    ) -> Result<SchemaChangeResult, CallError> {
        let req = pb::ApplySchemaRequest {
            sql: change.sql.clone(),
            force: change.force,
            allow_replication: change.allow_replication,
            before_schema: change.before_schema.as_ref().map(convert::schema_to_proto),
            after_schema: change.after_schema.as_ref().map(convert::schema_to_proto),
        };
        let resp: pb::ApplySchemaResponse = self.call(ctx, endpoint, "ApplySchema", &req).await?;
        Ok(convert::schema_change_result(
            resp.before_schema,
            resp.after_schema,
        ))
    }

    pub async fn execute_fetch_as_dba(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        fetch: &DbaFetch,
    ) -> Result<QueryResult, CallError> {
        let req = pb::ExecuteFetchAsDbaRequest {
            query: fetch.query.clone(),
            db_name: fetch.db_name.clone(),
            max_rows: fetch.max_rows,
            want_fields: fetch.want_fields,
            disable_binlogs: fetch.disable_binlogs,
            reload_schema: fetch.reload_schema,
        };
        let resp: pb::ExecuteFetchResponse =
            self.call(ctx, endpoint, "ExecuteFetchAsDba", &req).await?;
        Ok(resp
            .result
            .map(convert::query_result_from_proto)
            .unwrap_or_default())
    }

    pub async fn execute_fetch_as_app(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        query: &str,
        max_rows: u64,
        want_fields: bool,
    ) -> Result<QueryResult, CallError> {
        let req = pb::ExecuteFetchAsAppRequest {
            query: query.to_string(),
            max_rows,
            want_fields,
        };
        let resp: pb::ExecuteFetchResponse =
            self.call(ctx, endpoint, "ExecuteFetchAsApp", &req).await?;
        Ok(resp
            .result
            .map(convert::query_result_from_proto)
            .unwrap_or_default())
    }

    // ---------------------------------------------------------------------
    // Replication
    // ---------------------------------------------------------------------

    pub async fn replication_status(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<ReplicationStatus, CallError> {
        let resp: pb::ReplicationStatusResponse = self
            .call(
                ctx,
                endpoint,
                "ReplicationStatus",
                &pb::ReplicationStatusRequest {},
            )
            .await?;
        Ok(resp
            .status
            .map(convert::replication_status_from_proto)
            .unwrap_or_default())
    }

    pub async fn primary_position(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<ReplicationPosition, CallError> {
        let resp: pb::PositionResponse = self
            .call(ctx, endpoint, "PrimaryPosition", &pb::PrimaryPositionRequest {})
            .await?;
        Ok(position(resp))
    }

    pub async fn stop_replication(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::StopReplicationResponse = self
            .call(ctx, endpoint, "StopReplication", &pb::StopReplicationRequest {})
            .await?;
        Ok(())
    }

    /// Stop replication once it reaches `minimum`, waiting at most `wait_time`
    /// on the agent. Returns the position replication stopped at.
    pub async fn stop_replication_minimum(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        minimum: &ReplicationPosition,
        wait_time: Duration,
    ) -> Result<ReplicationPosition, CallError> {
        let req = pb::StopReplicationMinimumRequest {
            position: minimum.as_str().to_string(),
            wait_timeout: duration_to_nanos(wait_time),
        };
        let resp: pb::PositionResponse = self
            .call(ctx, endpoint, "StopReplicationMinimum", &req)
            .await?;
        Ok(position(resp))
    }

    pub async fn start_replication(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::StartReplicationResponse = self
            .call(ctx, endpoint, "StartReplication", &pb::StartReplicationRequest {})
            .await?;
        Ok(())
    }

    pub async fn tablet_externally_reparented(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        external_id: &str,
    ) -> Result<(), CallError> {
        let req = pb::TabletExternallyReparentedRequest {
            external_id: external_id.to_string(),
        };
        let _: pb::TabletExternallyReparentedResponse = self
            .call(ctx, endpoint, "TabletExternallyReparented", &req)
            .await?;
        Ok(())
    }

    /// Addresses of the replicas attached to this tablet.
    pub async fn get_replicas(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<Vec<String>, CallError> {
        let resp: pb::GetReplicasResponse = self
            .call(ctx, endpoint, "GetReplicas", &pb::GetReplicasRequest {})
            .await?;
        Ok(resp.addrs)
    }

    pub async fn wait_blp_position(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        blp_position: &BlpPosition,
        wait_time: Duration,
    ) -> Result<(), CallError> {
        let req = pb::WaitBlpPositionRequest {
            blp_position: Some(convert::blp_position_to_proto(blp_position)),
            wait_timeout: duration_to_nanos(wait_time),
        };
        let _: pb::WaitBlpPositionResponse =
            self.call(ctx, endpoint, "WaitBlpPosition", &req).await?;
        Ok(())
    }

    pub async fn stop_blp(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<Vec<BlpPosition>, CallError> {
        let resp: pb::StopBlpResponse = self
            .call(ctx, endpoint, "StopBlp", &pb::StopBlpRequest {})
            .await?;
        Ok(resp
            .blp_positions
            .into_iter()
            .map(convert::blp_position_from_proto)
            .collect())
    }

    pub async fn start_blp(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::StartBlpResponse = self
            .call(ctx, endpoint, "StartBlp", &pb::StartBlpRequest {})
            .await?;
        Ok(())
    }

    /// Run binlog players until they reach `positions`, then report the
    /// database position.
    pub async fn run_blp_until(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        positions: &[BlpPosition],
        wait_time: Duration,
    ) -> Result<ReplicationPosition, CallError> {
        let req = pb::RunBlpUntilRequest {
            blp_positions: positions.iter().map(convert::blp_position_to_proto).collect(),
            wait_timeout: duration_to_nanos(wait_time),
        };
        let resp: pb::PositionResponse = self.call(ctx, endpoint, "RunBlpUntil", &req).await?;
        Ok(position(resp))
    }

    // ---------------------------------------------------------------------
    // Reparenting
    // ---------------------------------------------------------------------

    pub async fn reset_replication(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::ResetReplicationResponse = self
            .call(ctx, endpoint, "ResetReplication", &pb::ResetReplicationRequest {})
            .await?;
        Ok(())
    }

    /// Make the tablet a primary; returns its replication position.
    pub async fn init_primary(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<ReplicationPosition, CallError> {
        let resp: pb::PositionResponse = self
            .call(ctx, endpoint, "InitPrimary", &pb::InitPrimaryRequest {})
            .await?;
        Ok(position(resp))
    }

    pub async fn populate_reparent_journal(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        time_created_ns: i64,
        action_name: &str,
        primary_alias: &TabletAlias,
        replication_position: &ReplicationPosition,
    ) -> Result<(), CallError> {
        let req = pb::PopulateReparentJournalRequest {
            time_created_ns,
            action_name: action_name.to_string(),
            primary_alias: Some(convert::alias_to_proto(primary_alias)),
            replication_position: replication_position.as_str().to_string(),
        };
        let _: pb::PopulateReparentJournalResponse = self
            .call(ctx, endpoint, "PopulateReparentJournal", &req)
            .await?;
        Ok(())
    }

    /// Point the tablet at `parent`. The agent may wait for the journal
    /// entry until the context deadline, which is forwarded as its wait
    /// budget.
    pub async fn init_replica(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        parent: &TabletAlias,
        replication_position: &ReplicationPosition,
        time_created_ns: i64,
    ) -> Result<(), CallError> {
        let req = pb::InitReplicaRequest {
            parent: Some(convert::alias_to_proto(parent)),
            replication_position: replication_position.as_str().to_string(),
            time_created_ns,
            wait_timeout: wait_timeout_nanos(ctx, endpoint, "InitReplica")?,
        };
        let _: pb::InitReplicaResponse = self.call(ctx, endpoint, "InitReplica", &req).await?;
        Ok(())
    }

    /// Demote a primary; returns the position it stopped at.
    pub async fn demote_primary(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<ReplicationPosition, CallError> {
        let resp: pb::PositionResponse = self
            .call(ctx, endpoint, "DemotePrimary", &pb::DemotePrimaryRequest {})
            .await?;
        Ok(position(resp))
    }

    pub async fn promote_replica_when_caught_up(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        target: &ReplicationPosition,
    ) -> Result<ReplicationPosition, CallError> {
        let req = pb::PromoteReplicaWhenCaughtUpRequest {
            position: target.as_str().to_string(),
        };
        let resp: pb::PositionResponse = self
            .call(ctx, endpoint, "PromoteReplicaWhenCaughtUp", &req)
            .await?;
        Ok(position(resp))
    }

    pub async fn replica_was_promoted(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(), CallError> {
        let _: pb::ReplicaWasPromotedResponse = self
            .call(
                ctx,
                endpoint,
                "ReplicaWasPromoted",
                &pb::ReplicaWasPromotedRequest {},
            )
            .await?;
        Ok(())
    }

    /// Re-point a replica at `parent`, forwarding the context deadline as
    /// the agent's wait budget.
    pub async fn set_primary(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        parent: &TabletAlias,
        time_created_ns: i64,
        force_start_replication: bool,
    ) -> Result<(), CallError> {
        let req = pb::SetPrimaryRequest {
            parent: Some(convert::alias_to_proto(parent)),
            time_created_ns,
            force_start_replication,
            wait_timeout: wait_timeout_nanos(ctx, endpoint, "SetPrimary")?,
        };
        let _: pb::SetPrimaryResponse = self.call(ctx, endpoint, "SetPrimary", &req).await?;
        Ok(())
    }

    pub async fn replica_was_restarted(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        parent: &TabletAlias,
    ) -> Result<(), CallError> {
        let req = pb::ReplicaWasRestartedRequest {
            parent: Some(convert::alias_to_proto(parent)),
        };
        let _: pb::ReplicaWasRestartedResponse =
            self.call(ctx, endpoint, "ReplicaWasRestarted", &req).await?;
        Ok(())
    }

    pub async fn stop_replication_and_get_status(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<ReplicationStatus, CallError> {
        let resp: pb::ReplicationStatusResponse = self
            .call(
                ctx,
                endpoint,
                "StopReplicationAndGetStatus",
                &pb::StopReplicationAndGetStatusRequest {},
            )
            .await?;
        Ok(resp
            .status
            .map(convert::replication_status_from_proto)
            .unwrap_or_default())
    }

    pub async fn promote_replica(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<ReplicationPosition, CallError> {
        let resp: pb::PositionResponse = self
            .call(ctx, endpoint, "PromoteReplica", &pb::PromoteReplicaRequest {})
            .await?;
        Ok(position(resp))
    }

    // ---------------------------------------------------------------------
    // Streaming
    // ---------------------------------------------------------------------

    /// Subscribe to the tablet's health reports.
    ///
    /// The stream runs until the agent ends it or `ctx` finishes; the end of
    /// `ctx` is reported by [`StreamCompletion::finish`] as a stream error.
    pub async fn health_stream(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
    ) -> Result<(mpsc::Receiver<HealthStreamReply>, StreamCompletion), CallError> {
        self.stream(
            ctx,
            endpoint,
            "StreamHealth",
            &pb::StreamHealthRequest {},
            self.stream_options(),
            convert::health_reply_from_proto,
        )
        .await
    }

    /// Start a backup and follow its log.
    ///
    /// Ending `ctx` stops following (the remote backup keeps running) and
    /// [`StreamCompletion::finish`] reports an interruption.
    pub async fn backup(
        &self,
        ctx: &CallContext,
        endpoint: &RemoteEndpoint,
        concurrency: i64,
    ) -> Result<(mpsc::Receiver<LoggerEvent>, StreamCompletion), CallError> {
        self.stream(
            ctx,
            endpoint,
            "Backup",
            &pb::BackupRequest { concurrency },
            self.stream_options().interruptible(),
            convert::backup_event_from_proto,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDialer;
    use tmrpc_common::CallErrorKind;
    use tonic::Code;

    fn endpoint() -> RemoteEndpoint {
        RemoteEndpoint::new(TabletAlias::new("zone1", 100), "mock:1")
    }

    fn client() -> (MockDialer, TabletManagerClient<MockDialer>) {
        let mock = MockDialer::new();
        (mock.clone(), TabletManagerClient::new(mock))
    }

    #[tokio::test]
    async fn test_ping_echo() {
        let (mock, client) = client();
        mock.respond(
            "Ping",
            &pb::PingResponse {
                payload: PING_PAYLOAD.into(),
            },
        );
        client
            .ping(&CallContext::background(), &endpoint())
            .await
            .unwrap();
        let sent: pb::PingRequest = mock.last_request("Ping").unwrap();
        assert_eq!(sent.payload, PING_PAYLOAD);
    }

    #[tokio::test]
    async fn test_ping_bad_echo() {
        let (mock, client) = client();
        mock.respond(
            "Ping",
            &pb::PingResponse {
                payload: "something else".into(),
            },
        );
        let err = client
            .ping(&CallContext::background(), &endpoint())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CallErrorKind::Remote);
        assert!(err.to_string().contains("bad ping result: something else"));
    }

    #[tokio::test]
    async fn test_sleep_sends_nanos() {
        let (mock, client) = client();
        mock.respond("Sleep", &pb::SleepResponse {});
        client
            .sleep(
                &CallContext::background(),
                &endpoint(),
                Duration::from_millis(250),
            )
            .await
            .unwrap();
        let sent: pb::SleepRequest = mock.last_request("Sleep").unwrap();
        assert_eq!(sent.duration, 250_000_000);
    }

    #[tokio::test]
    async fn test_execute_hook() {
        let (mock, client) = client();
        mock.respond(
            "ExecuteHook",
            &pb::ExecuteHookResponse {
                exit_status: 0,
                stdout: "ok\n".into(),
                stderr: String::new(),
            },
        );
        let mut hook = Hook::new("test_hook");
        hook.parameters.push("--flag".into());
        hook.extra_env.insert("KEY".into(), "VALUE".into());

        let result = client
            .execute_hook(&CallContext::background(), &endpoint(), &hook)
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.stdout, "ok\n");

        let sent: pb::ExecuteHookRequest = mock.last_request("ExecuteHook").unwrap();
        assert_eq!(sent.name, "test_hook");
        assert_eq!(sent.parameters, vec!["--flag"]);
        assert_eq!(sent.extra_env.get("KEY").map(String::as_str), Some("VALUE"));
    }

    #[tokio::test]
    async fn test_change_type_sends_enum() {
        let (mock, client) = client();
        mock.respond("ChangeType", &pb::ChangeTypeResponse {});
        client
            .change_type(&CallContext::background(), &endpoint(), TabletType::Rdonly)
            .await
            .unwrap();
        let sent: pb::ChangeTypeRequest = mock.last_request("ChangeType").unwrap();
        assert_eq!(
            sent.tablet_type(),
            tmrpc_proto::topodata::TabletType::Rdonly
        );
    }

    #[tokio::test]
    async fn test_scrap_issues_one_call() {
        let (mock, client) = client();
        mock.respond("Scrap", &pb::ScrapResponse {});
        client
            .scrap(&CallContext::background(), &endpoint())
            .await
            .unwrap();
        assert_eq!(mock.methods_called(), vec!["Scrap".to_string()]);
        assert_eq!(mock.dial_count(), 1);
        assert_eq!(mock.release_count(), 1);
    }

    #[tokio::test]
    async fn test_scrap_remote_failure() {
        let (mock, client) = client();
        mock.fail("Scrap", Code::FailedPrecondition, "tablet is serving");
        let err = client
            .scrap(&CallContext::background(), &endpoint())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CallErrorKind::Remote);
        assert!(err.to_string().contains("tablet is serving"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_execute_fetch_as_dba() {
        let (mock, client) = client();
        mock.respond(
            "ExecuteFetchAsDba",
            &pb::ExecuteFetchResponse {
                result: Some(pb::QueryResult {
                    rows_affected: 3,
                    ..Default::default()
                }),
            },
        );
        let fetch = DbaFetch {
            max_rows: 100,
            disable_binlogs: true,
            ..DbaFetch::new("DELETE FROM t", "vt_commerce")
        };
        let result = client
            .execute_fetch_as_dba(&CallContext::background(), &endpoint(), &fetch)
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 3);

        let sent: pb::ExecuteFetchAsDbaRequest = mock.last_request("ExecuteFetchAsDba").unwrap();
        assert_eq!(sent.db_name, "vt_commerce");
        assert_eq!(sent.max_rows, 100);
        assert!(sent.disable_binlogs);
        assert!(!sent.reload_schema);
    }

    #[tokio::test]
    async fn test_missing_schema_is_empty() {
        let (mock, client) = client();
        mock.respond(
            "GetSchema",
            &pb::GetSchemaResponse {
                schema_definition: None,
            },
        );
        let schema = client
            .get_schema(&CallContext::background(), &endpoint(), &[], &[], false)
            .await
            .unwrap();
        assert_eq!(schema, SchemaDefinition::default());
    }

    #[tokio::test]
    async fn test_stop_blp_positions() {
        let (mock, client) = client();
        mock.respond(
            "StopBlp",
            &pb::StopBlpResponse {
                blp_positions: vec![
                    pb::BlpPosition {
                        uid: 1,
                        position: "p1".into(),
                    },
                    pb::BlpPosition {
                        uid: 2,
                        position: "p2".into(),
                    },
                ],
            },
        );
        let positions = client
            .stop_blp(&CallContext::background(), &endpoint())
            .await
            .unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1].uid, 2);
        assert_eq!(positions[1].position.as_str(), "p2");
    }

    #[tokio::test]
    async fn test_run_blp_until_sends_wait_time() {
        let (mock, client) = client();
        mock.respond(
            "RunBlpUntil",
            &pb::PositionResponse {
                position: "reached".into(),
            },
        );
        let target = vec![BlpPosition {
            uid: 5,
            position: ReplicationPosition::new("target"),
        }];
        let pos = client
            .run_blp_until(
                &CallContext::background(),
                &endpoint(),
                &target,
                Duration::from_secs(30),
            )
            .await
            .unwrap();
        assert_eq!(pos.as_str(), "reached");

        let sent: pb::RunBlpUntilRequest = mock.last_request("RunBlpUntil").unwrap();
        assert_eq!(sent.blp_positions[0].uid, 5);
        assert_eq!(sent.wait_timeout, 30_000_000_000);
    }

    #[tokio::test]
    async fn test_remote_failure_surfaces() {
        let (mock, client) = client();
        mock.fail("SetReadWrite", Code::Internal, "disk full");
        let err = client
            .set_read_write(&CallContext::background(), &endpoint())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote error for TabletManager.SetReadWrite on zone1-0000000100: disk full"
        );
    }

    #[tokio::test]
    async fn test_populate_reparent_journal() {
        let (mock, client) = client();
        mock.respond(
            "PopulateReparentJournal",
            &pb::PopulateReparentJournalResponse {},
        );
        let primary = TabletAlias::new("zone2", 200);
        client
            .populate_reparent_journal(
                &CallContext::background(),
                &endpoint(),
                1_700_000_000_000_000_000,
                "PlannedReparentShard",
                &primary,
                &ReplicationPosition::new("MySQL56/abc:1-42"),
            )
            .await
            .unwrap();

        let sent: pb::PopulateReparentJournalRequest =
            mock.last_request("PopulateReparentJournal").unwrap();
        let alias = sent.primary_alias.unwrap();
        assert_eq!((alias.cell.as_str(), alias.uid), ("zone2", 200));
        assert_eq!(sent.action_name, "PlannedReparentShard");
    }
}
