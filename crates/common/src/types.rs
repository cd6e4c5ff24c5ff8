//! Domain values returned by tablet manager operations.

use crate::{TabletAlias, TabletType};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

/// An opaque replication position (e.g. a GTID set) as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ReplicationPosition(pub String);

impl ReplicationPosition {
    pub fn new(position: impl Into<String>) -> Self {
        Self(position.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replication state of a replica's database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicationStatus {
    pub position: ReplicationPosition,
    pub io_thread_running: bool,
    pub sql_thread_running: bool,
    pub seconds_behind_primary: u32,
    pub primary_host: String,
    pub primary_port: u32,
    pub primary_connect_retry: u32,
}

impl ReplicationStatus {
    /// Both replication threads are running.
    pub fn is_replicating(&self) -> bool {
        self.io_thread_running && self.sql_thread_running
    }
}

/// Position of one binlog player stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlpPosition {
    pub uid: u32,
    pub position: ReplicationPosition,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDefinition {
    pub name: String,
    pub schema: String,
    pub columns: Vec<String>,
    pub primary_key_columns: Vec<String>,
    /// `BASE TABLE` or `VIEW`.
    pub table_type: String,
    pub data_length: u64,
    pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDefinition {
    pub database_schema: String,
    pub table_definitions: Vec<TableDefinition>,
    pub version: String,
}

impl SchemaDefinition {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.table_definitions.iter().find(|t| t.name == name)
    }
}

/// A schema change to preflight or apply on a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaChange {
    pub sql: String,
    pub force: bool,
    pub allow_replication: bool,
    pub before_schema: Option<SchemaDefinition>,
    pub after_schema: Option<SchemaDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaChangeResult {
    pub before_schema: Option<SchemaDefinition>,
    pub after_schema: Option<SchemaDefinition>,
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserPermission {
    pub host: String,
    pub user: String,
    pub password_checksum: u64,
    pub privileges: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbPermission {
    pub host: String,
    pub db: String,
    pub user: String,
    pub privileges: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Permissions {
    pub user_permissions: Vec<UserPermission>,
    pub db_permissions: Vec<DbPermission>,
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// A hook script to run on the tablet host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hook {
    pub name: String,
    pub parameters: Vec<String>,
    pub extra_env: BTreeMap<String, String>,
}

impl Hook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HookResult {
    pub exit_status: i64,
    pub stdout: String,
    pub stderr: String,
}

impl HookResult {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    pub name: String,
    pub field_type: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows_affected: u64,
    pub insert_id: u64,
    pub rows: Vec<Vec<Vec<u8>>>,
}

// ---------------------------------------------------------------------------
// Streaming payloads
// ---------------------------------------------------------------------------

/// Tablet record attached to a health report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tablet {
    pub alias: TabletAlias,
    pub hostname: String,
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
}

/// One frame of a tablet's health stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthStreamReply {
    pub tablet: Option<Tablet>,
    pub binlog_player_map_size: i64,
    /// Empty when the tablet is healthy.
    pub health_error: String,
    pub replication_delay: Duration,
}

impl HealthStreamReply {
    pub fn is_healthy(&self) -> bool {
        self.health_error.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
    Console,
}

/// One log line relayed from a long-running remote action such as a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerEvent {
    pub time: SystemTime,
    pub level: LogLevel,
    pub file: String,
    pub line: i64,
    pub value: String,
}

impl fmt::Display for LoggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            LogLevel::Info => "I",
            LogLevel::Warning => "W",
            LogLevel::Error => "E",
            LogLevel::Console => return f.write_str(&self.value),
        };
        write!(f, "{} {}:{}] {}", tag, self.file, self.line, self.value)
    }
}
