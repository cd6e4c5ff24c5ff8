//! Integration tests: drive `TabletManagerClient` end to end through the
//! scripted in-memory dialer, covering deadlines, cancellation, remote and
//! transport failures, and both streaming operations.

use std::time::Duration;
use tmrpc_common::types::{LogLevel, ReplicationPosition};
use tmrpc_common::{is_timeout_error, CallError, CallErrorKind, DialError, RemoteEndpoint, TabletAlias};
use tmrpc_net::{
    CallContext, ChaosConfig, ChaosDialer, MockDialer, MockStream, TabletManagerClient,
};
use tmrpc_proto::logutil;
use tmrpc_proto::tabletmanagerdata as pb;
use tmrpc_proto::topodata;
use tonic::Code;

fn endpoint() -> RemoteEndpoint {
    RemoteEndpoint::new(TabletAlias::new("zone1", 100), "10.0.0.1:15999")
}

fn setup() -> (MockDialer, TabletManagerClient<MockDialer>) {
    let mock = MockDialer::new();
    (mock.clone(), TabletManagerClient::new(mock))
}

fn health(error: &str) -> pb::StreamHealthResponse {
    pb::StreamHealthResponse {
        tablet: Some(topodata::Tablet {
            alias: Some(topodata::TabletAlias {
                cell: "zone1".into(),
                uid: 100,
            }),
            tablet_type: topodata::TabletType::Replica as i32,
            ..Default::default()
        }),
        health_error: error.to_string(),
        replication_delay: 2_000_000_000,
        ..Default::default()
    }
}

fn backup_line(value: &str) -> pb::BackupResponse {
    pb::BackupResponse {
        event: Some(logutil::Event {
            time: Some(logutil::Time {
                seconds: 1_700_000_000,
                nanoseconds: 0,
            }),
            level: logutil::Level::Info as i32,
            file: "backup.go".into(),
            line: 1,
            value: value.to_string(),
        }),
    }
}

// ────────────────────────── Deadlines ──────────────────────────

#[tokio::test(start_paused = true)]
async fn test_past_deadline_fails_without_dialing() {
    let (mock, client) = setup();
    let ctx = CallContext::with_timeout(Duration::from_millis(1));
    tokio::time::advance(Duration::from_millis(2)).await;

    let err = client.get_schema(&ctx, &endpoint(), &[], &[], false).await.unwrap_err();
    assert!(is_timeout_error(&err));
    assert_eq!(
        err.to_string(),
        "timeout connecting to TabletManager.GetSchema on zone1-0000000100"
    );
    assert_eq!(mock.dial_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_agent_times_out_and_releases() {
    let (mock, client) = setup();
    mock.respond_after(
        "ReplicationStatus",
        Duration::from_secs(30),
        &pb::ReplicationStatusResponse::default(),
    );
    let ctx = CallContext::with_timeout(Duration::from_secs(5));

    let err = client.replication_status(&ctx, &endpoint()).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("ReplicationStatus"));
    assert!(err.to_string().contains("zone1-0000000100"));
    assert_eq!(mock.dial_count(), 1);
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_deadline_never_times_out() {
    let (mock, client) = setup();
    mock.respond_after(
        "Sleep",
        Duration::from_secs(24 * 3600),
        &pb::SleepResponse {},
    );

    client
        .sleep(&CallContext::background(), &endpoint(), Duration::from_secs(24 * 3600))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_follows_deadline() {
    let (mock, client) = setup();
    mock.respond("InitReplica", &pb::InitReplicaResponse {});
    mock.respond("SetPrimary", &pb::SetPrimaryResponse {});
    let ctx = CallContext::with_timeout(Duration::from_secs(30));
    let parent = TabletAlias::new("zone1", 1);

    client
        .init_replica(&ctx, &endpoint(), &parent, &ReplicationPosition::new("pos"), 42)
        .await
        .unwrap();
    let sent: pb::InitReplicaRequest = mock.last_request("InitReplica").unwrap();
    assert_eq!(sent.wait_timeout, 30_000_000_000);
    assert_eq!(sent.time_created_ns, 42);
    assert_eq!(sent.parent.unwrap().uid, 1);
    assert_eq!(mock.last_timeout("InitReplica"), Some(Duration::from_secs(30)));

    client
        .set_primary(&CallContext::background(), &endpoint(), &parent, 7, true)
        .await
        .unwrap();
    let sent: pb::SetPrimaryRequest = mock.last_request("SetPrimary").unwrap();
    assert_eq!(sent.wait_timeout, 0);
    assert_eq!(mock.last_timeout("SetPrimary"), None);
    assert!(sent.force_start_replication);
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_on_expired_deadline() {
    let (mock, client) = setup();
    let ctx = CallContext::with_timeout(Duration::from_millis(1));
    tokio::time::advance(Duration::from_millis(5)).await;

    let err = client
        .set_primary(&ctx, &endpoint(), &TabletAlias::new("zone1", 1), 0, false)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(mock.dial_count(), 0);
}

// ────────────────────────── Cancellation ──────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_unary_call() {
    let (mock, client) = setup();
    mock.respond_after(
        "StopReplication",
        Duration::from_secs(10),
        &pb::StopReplicationResponse {},
    );
    let ctx = CallContext::with_timeout(Duration::from_secs(60));
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = client.stop_replication(&ctx, &endpoint()).await.unwrap_err();
    assert_eq!(err.kind(), CallErrorKind::Interrupted);
    assert!(!is_timeout_error(&err));
    assert_eq!(
        err.to_string(),
        "interrupted waiting for TabletManager.StopReplication to zone1-0000000100"
    );
    assert_eq!(mock.release_count(), 1);
}

// ────────────────────────── Failures ──────────────────────────

#[tokio::test]
async fn test_dial_failure_surfaces_unchanged() {
    let (mock, client) = setup();
    let dial_err = DialError::Connect {
        addr: "10.0.0.1:15999".into(),
        reason: "connection refused".into(),
    };
    mock.fail_dial(dial_err.clone());

    let err = client.ping(&CallContext::background(), &endpoint()).await.unwrap_err();
    match &err {
        CallError::Dial { source, alias, .. } => {
            assert_eq!(source, &dial_err);
            assert_eq!(alias, &endpoint().alias);
        }
        other => panic!("expected dial error, got {}", other),
    }
    assert_eq!(err.kind(), CallErrorKind::Transport);
    assert!(!is_timeout_error(&err));
}

#[tokio::test]
async fn test_remote_error_names_tablet() {
    let (mock, client) = setup();
    mock.fail("DemotePrimary", Code::FailedPrecondition, "tablet is not primary");

    let err = client
        .demote_primary(&CallContext::background(), &endpoint())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), CallErrorKind::Remote);
    assert_eq!(err.alias(), Some(&endpoint().alias));
    assert!(err.to_string().contains("tablet is not primary"));
}

#[tokio::test]
async fn test_sequential_calls_dial_independently() {
    let (mock, client) = setup();
    mock.respond(
        "PrimaryPosition",
        &pb::PositionResponse {
            position: "MySQL56/abc:1-5".into(),
        },
    );
    mock.respond(
        "GetReplicas",
        &pb::GetReplicasResponse {
            addrs: vec!["10.0.0.2:3306".into(), "10.0.0.3:3306".into()],
        },
    );

    let ctx = CallContext::background();
    let pos = client.primary_position(&ctx, &endpoint()).await.unwrap();
    let replicas = client.get_replicas(&ctx, &endpoint()).await.unwrap();

    assert_eq!(pos.as_str(), "MySQL56/abc:1-5");
    assert_eq!(replicas.len(), 2);
    assert_eq!(mock.dial_count(), 2);
    assert_eq!(mock.release_count(), 2);
    assert_eq!(
        mock.methods_called(),
        vec!["PrimaryPosition".to_string(), "GetReplicas".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_partitioned_tablet_is_transport_error() {
    let mock = MockDialer::new();
    let chaos = ChaosDialer::new(mock.clone(), ChaosConfig::default());
    chaos.add_partition(endpoint().alias).await;
    let client = TabletManagerClient::new(chaos);

    let err = client
        .ping(&CallContext::with_timeout(Duration::from_secs(1)), &endpoint())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), CallErrorKind::Transport);
    assert_eq!(mock.dial_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_is_dial_error_not_timeout() {
    let mock = MockDialer::new();
    let chaos = ChaosDialer::new(
        mock.clone(),
        ChaosConfig {
            latency: Duration::from_secs(10),
            ..Default::default()
        },
    );
    let client = TabletManagerClient::new(chaos);

    let err = client
        .ping(&CallContext::with_timeout(Duration::from_secs(2)), &endpoint())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Dial {
            source: DialError::TimedOut { .. },
            ..
        }
    ));
    assert!(!err.is_timeout());
}

// ────────────────────────── Streaming ──────────────────────────

#[tokio::test]
async fn test_health_stream_delivers_reports_in_order() {
    let (mock, client) = setup();
    mock.stream(
        "StreamHealth",
        MockStream::new()
            .frame(&health(""))
            .frame(&health("replication lagging"))
            .frame(&health("")),
    );

    let (mut rx, mut done) = client
        .health_stream(&CallContext::background(), &endpoint())
        .await
        .unwrap();

    let mut reports = Vec::new();
    while let Some(reply) = rx.recv().await {
        reports.push(reply);
    }
    assert_eq!(reports.len(), 3);
    assert!(reports[0].is_healthy());
    assert_eq!(reports[1].health_error, "replication lagging");
    assert_eq!(reports[2].replication_delay, Duration::from_secs(2));
    assert_eq!(
        reports[0].tablet.as_ref().map(|t| t.alias.clone()),
        Some(TabletAlias::new("zone1", 100))
    );

    assert!(done.finish().await.is_ok());
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test]
async fn test_health_stream_cancel_reports_stream_error() {
    let (mock, client) = setup();
    mock.stream("StreamHealth", MockStream::new().frame(&health("")).hang());
    let ctx = CallContext::background();

    let (mut rx, mut done) = client.health_stream(&ctx, &endpoint()).await.unwrap();
    assert!(rx.recv().await.is_some());
    ctx.cancel();
    assert!(rx.recv().await.is_none());

    let err = done.finish().await.unwrap_err();
    assert!(matches!(err, CallError::Stream { .. }), "got: {}", err);
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test]
async fn test_backup_streams_log_then_fails() {
    let (mock, client) = setup();
    mock.stream(
        "Backup",
        MockStream::new()
            .frame(&backup_line("starting backup"))
            .frame(&backup_line("copying files"))
            .fail(Code::Internal, "disk full"),
    );

    let (mut rx, mut done) = client
        .backup(&CallContext::background(), &endpoint(), 4)
        .await
        .unwrap();

    let mut lines = Vec::new();
    while let Some(event) = rx.recv().await {
        assert_eq!(event.level, LogLevel::Info);
        lines.push(event.value);
    }
    assert_eq!(lines, vec!["starting backup", "copying files"]);

    let err = done.finish().await.unwrap_err();
    assert!(err.to_string().contains("disk full"));
    // The error is cached.
    assert_eq!(done.finish().await.unwrap_err().to_string(), err.to_string());

    let sent: pb::BackupRequest = mock.last_request("Backup").unwrap();
    assert_eq!(sent.concurrency, 4);
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test]
async fn test_backup_cancel_is_interruption() {
    let (mock, client) = setup();
    mock.stream(
        "Backup",
        MockStream::new()
            .frame(&backup_line("starting backup"))
            .delay(Duration::from_millis(100))
            .frame(&backup_line("copying files"))
            .hang(),
    );
    let ctx = CallContext::background();

    let (mut rx, mut done) = client.backup(&ctx, &endpoint(), 2).await.unwrap();
    let first = rx.recv().await.unwrap();
    assert_eq!(first.value, "starting backup");

    ctx.cancel();
    while rx.recv().await.is_some() {}

    let err = done.finish().await.unwrap_err();
    assert_eq!(err.kind(), CallErrorKind::Interrupted);
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_open_past_deadline_never_dials() {
    let (mock, client) = setup();
    let ctx = CallContext::with_timeout(Duration::from_millis(1));
    tokio::time::advance(Duration::from_millis(2)).await;

    let err = client.backup(&ctx, &endpoint(), 1).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(mock.dial_count(), 0);
}
