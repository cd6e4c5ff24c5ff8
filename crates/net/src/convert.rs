//! Conversions between proto types and domain types.

use crate::deadline::nanos_to_duration;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tmrpc_common::types::{
    BlpPosition, DbPermission, Field, HealthStreamReply, Hook, HookResult, LogLevel, LoggerEvent,
    Permissions, QueryResult, ReplicationPosition, ReplicationStatus, SchemaChangeResult,
    SchemaDefinition, TableDefinition, Tablet, UserPermission,
};
use tmrpc_common::{TabletAlias, TabletType};
use tmrpc_proto::logutil;
use tmrpc_proto::tabletmanagerdata as pb;
use tmrpc_proto::topodata;

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

pub fn alias_to_proto(alias: &TabletAlias) -> topodata::TabletAlias {
    topodata::TabletAlias {
        cell: alias.cell.clone(),
        uid: alias.uid,
    }
}

pub fn alias_from_proto(proto: &topodata::TabletAlias) -> TabletAlias {
    TabletAlias::new(proto.cell.clone(), proto.uid)
}

pub fn tablet_type_to_proto(t: TabletType) -> i32 {
    let proto = match t {
        TabletType::Unknown => topodata::TabletType::Unknown,
        TabletType::Idle => topodata::TabletType::Idle,
        TabletType::Primary => topodata::TabletType::Primary,
        TabletType::Replica => topodata::TabletType::Replica,
        TabletType::Rdonly => topodata::TabletType::Rdonly,
        TabletType::Spare => topodata::TabletType::Spare,
        TabletType::Experimental => topodata::TabletType::Experimental,
        TabletType::Backup => topodata::TabletType::Backup,
        TabletType::Restore => topodata::TabletType::Restore,
        TabletType::Worker => topodata::TabletType::Worker,
        TabletType::Scrap => topodata::TabletType::Scrap,
    };
    proto as i32
}

/// Values this client does not know map to `Unknown`.
pub fn tablet_type_from_proto(value: i32) -> TabletType {
    match topodata::TabletType::try_from(value) {
        Ok(topodata::TabletType::Unknown) | Err(_) => TabletType::Unknown,
        Ok(topodata::TabletType::Idle) => TabletType::Idle,
        Ok(topodata::TabletType::Primary) => TabletType::Primary,
        Ok(topodata::TabletType::Replica) => TabletType::Replica,
        Ok(topodata::TabletType::Rdonly) => TabletType::Rdonly,
        Ok(topodata::TabletType::Spare) => TabletType::Spare,
        Ok(topodata::TabletType::Experimental) => TabletType::Experimental,
        Ok(topodata::TabletType::Backup) => TabletType::Backup,
        Ok(topodata::TabletType::Restore) => TabletType::Restore,
        Ok(topodata::TabletType::Worker) => TabletType::Worker,
        Ok(topodata::TabletType::Scrap) => TabletType::Scrap,
    }
}

/// `None` when the record carries no alias.
pub fn tablet_from_proto(proto: &topodata::Tablet) -> Option<Tablet> {
    let alias = alias_from_proto(proto.alias.as_ref()?);
    Some(Tablet {
        alias,
        hostname: proto.hostname.clone(),
        keyspace: proto.keyspace.clone(),
        shard: proto.shard.clone(),
        tablet_type: tablet_type_from_proto(proto.tablet_type),
    })
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

pub fn table_definition_to_proto(t: &TableDefinition) -> pb::TableDefinition {
    pb::TableDefinition {
        name: t.name.clone(),
        schema: t.schema.clone(),
        columns: t.columns.clone(),
        primary_key_columns: t.primary_key_columns.clone(),
        r#type: t.table_type.clone(),
        data_length: t.data_length,
        row_count: t.row_count,
    }
}

pub fn table_definition_from_proto(proto: pb::TableDefinition) -> TableDefinition {
    TableDefinition {
        name: proto.name,
        schema: proto.schema,
        columns: proto.columns,
        primary_key_columns: proto.primary_key_columns,
        table_type: proto.r#type,
        data_length: proto.data_length,
        row_count: proto.row_count,
    }
}

pub fn schema_to_proto(s: &SchemaDefinition) -> pb::SchemaDefinition {
    pb::SchemaDefinition {
        database_schema: s.database_schema.clone(),
        table_definitions: s
            .table_definitions
            .iter()
            .map(table_definition_to_proto)
            .collect(),
        version: s.version.clone(),
    }
}

pub fn schema_from_proto(proto: pb::SchemaDefinition) -> SchemaDefinition {
    SchemaDefinition {
        database_schema: proto.database_schema,
        table_definitions: proto
            .table_definitions
            .into_iter()
            .map(table_definition_from_proto)
            .collect(),
        version: proto.version,
    }
}

pub fn schema_change_result(
    before: Option<pb::SchemaDefinition>,
    after: Option<pb::SchemaDefinition>,
) -> SchemaChangeResult {
    SchemaChangeResult {
        before_schema: before.map(schema_from_proto),
        after_schema: after.map(schema_from_proto),
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

fn sorted(map: HashMap<String, String>) -> BTreeMap<String, String> {
    map.into_iter().collect()
}

pub fn permissions_from_proto(proto: pb::Permissions) -> Permissions {
    Permissions {
        user_permissions: proto
            .user_permissions
            .into_iter()
            .map(|u| UserPermission {
                host: u.host,
                user: u.user,
                password_checksum: u.password_checksum,
                privileges: sorted(u.privileges),
            })
            .collect(),
        db_permissions: proto
            .db_permissions
            .into_iter()
            .map(|d| DbPermission {
                host: d.host,
                db: d.db,
                user: d.user,
                privileges: sorted(d.privileges),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Hooks and queries
// ---------------------------------------------------------------------------

pub fn hook_to_proto(hook: &Hook) -> pb::ExecuteHookRequest {
    pb::ExecuteHookRequest {
        name: hook.name.clone(),
        parameters: hook.parameters.clone(),
        extra_env: hook
            .extra_env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

pub fn hook_result_from_proto(proto: pb::ExecuteHookResponse) -> HookResult {
    HookResult {
        exit_status: proto.exit_status,
        stdout: proto.stdout,
        stderr: proto.stderr,
    }
}

pub fn query_result_from_proto(proto: pb::QueryResult) -> QueryResult {
    QueryResult {
        fields: proto
            .fields
            .into_iter()
            .map(|f| Field {
                name: f.name,
                field_type: f.r#type,
            })
            .collect(),
        rows_affected: proto.rows_affected,
        insert_id: proto.insert_id,
        rows: proto.rows.into_iter().map(|r| r.values).collect(),
    }
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

pub fn replication_status_from_proto(proto: pb::ReplicationStatus) -> ReplicationStatus {
    ReplicationStatus {
        position: ReplicationPosition::new(proto.position),
        io_thread_running: proto.io_thread_running,
        sql_thread_running: proto.sql_thread_running,
        seconds_behind_primary: proto.seconds_behind_primary,
        primary_host: proto.primary_host,
        primary_port: proto.primary_port,
        primary_connect_retry: proto.primary_connect_retry,
    }
}

pub fn blp_position_to_proto(p: &BlpPosition) -> pb::BlpPosition {
    pb::BlpPosition {
        uid: p.uid,
        position: p.position.as_str().to_string(),
    }
}

pub fn blp_position_from_proto(proto: pb::BlpPosition) -> BlpPosition {
    BlpPosition {
        uid: proto.uid,
        position: ReplicationPosition::new(proto.position),
    }
}

// ---------------------------------------------------------------------------
// Stream payloads
// ---------------------------------------------------------------------------

pub fn health_reply_from_proto(proto: pb::StreamHealthResponse) -> HealthStreamReply {
    HealthStreamReply {
        tablet: proto.tablet.as_ref().and_then(tablet_from_proto),
        binlog_player_map_size: proto.binlog_player_map_size,
        health_error: proto.health_error,
        replication_delay: nanos_to_duration(proto.replication_delay),
    }
}

fn time_from_proto(proto: Option<&logutil::Time>) -> SystemTime {
    let Some(t) = proto else {
        return UNIX_EPOCH;
    };
    match (u64::try_from(t.seconds), u32::try_from(t.nanoseconds)) {
        (Ok(secs), Ok(nanos)) if nanos < 1_000_000_000 => UNIX_EPOCH + Duration::new(secs, nanos),
        (Ok(secs), _) => UNIX_EPOCH + Duration::from_secs(secs),
        _ => UNIX_EPOCH,
    }
}

pub fn logger_event_from_proto(proto: logutil::Event) -> LoggerEvent {
    let level = match logutil::Level::try_from(proto.level) {
        Ok(logutil::Level::Warning) => LogLevel::Warning,
        Ok(logutil::Level::Error) => LogLevel::Error,
        Ok(logutil::Level::Console) => LogLevel::Console,
        Ok(logutil::Level::Info) | Err(_) => LogLevel::Info,
    };
    LoggerEvent {
        time: time_from_proto(proto.time.as_ref()),
        level,
        file: proto.file,
        line: proto.line,
        value: proto.value,
    }
}

/// A backup frame without an event carries nothing to report; it becomes an
/// empty console line.
pub fn backup_event_from_proto(proto: pb::BackupResponse) -> LoggerEvent {
    match proto.event {
        Some(event) => logger_event_from_proto(event),
        None => LoggerEvent {
            time: UNIX_EPOCH,
            level: LogLevel::Console,
            file: String::new(),
            line: 0,
            value: String::new(),
        },
    }
}
