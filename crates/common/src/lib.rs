//! tmrpc-common: shared types for the tablet manager client.
//!
//! Provides the `TabletAlias` / `RemoteEndpoint` identity types, the
//! domain values returned by tablet manager operations, and the error
//! taxonomy every call path reports through.

pub mod error;
pub mod types;

pub use error::{is_timeout_error, CallError, CallErrorKind, DialError, TimeoutError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TabletAlias
// ---------------------------------------------------------------------------

/// Cluster-wide identity of a tablet: the cell it lives in plus a numeric uid.
///
/// Rendered as `<cell>-<uid padded to 10 digits>`, e.g. `zone1-0000000100`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TabletAlias {
    pub cell: String,
    pub uid: u32,
}

impl TabletAlias {
    pub fn new(cell: impl Into<String>, uid: u32) -> Self {
        Self {
            cell: cell.into(),
            uid,
        }
    }
}

impl fmt::Display for TabletAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:010}", self.cell, self.uid)
    }
}

impl fmt::Debug for TabletAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TabletAlias({})", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tablet alias {input:?}: {reason}")]
pub struct AliasParseError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for TabletAlias {
    type Err = AliasParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| AliasParseError {
            input: s.to_string(),
            reason,
        };
        // Cell names may themselves contain dashes; the uid is after the last one.
        let (cell, uid) = s.rsplit_once('-').ok_or_else(|| err("expected <cell>-<uid>"))?;
        if cell.is_empty() {
            return Err(err("empty cell"));
        }
        let uid = uid.parse::<u32>().map_err(|_| err("uid is not a number"))?;
        Ok(Self::new(cell, uid))
    }
}

impl TryFrom<String> for TabletAlias {
    type Error = AliasParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TabletAlias> for String {
    fn from(alias: TabletAlias) -> Self {
        alias.to_string()
    }
}

// ---------------------------------------------------------------------------
// TabletType
// ---------------------------------------------------------------------------

/// The serving role of a tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    #[default]
    Unknown,
    Idle,
    Primary,
    Replica,
    Rdonly,
    Spare,
    Experimental,
    Backup,
    Restore,
    Worker,
    Scrap,
}

impl TabletType {
    pub const ALL: [TabletType; 11] = [
        TabletType::Unknown,
        TabletType::Idle,
        TabletType::Primary,
        TabletType::Replica,
        TabletType::Rdonly,
        TabletType::Spare,
        TabletType::Experimental,
        TabletType::Backup,
        TabletType::Restore,
        TabletType::Worker,
        TabletType::Scrap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TabletType::Unknown => "unknown",
            TabletType::Idle => "idle",
            TabletType::Primary => "primary",
            TabletType::Replica => "replica",
            TabletType::Rdonly => "rdonly",
            TabletType::Spare => "spare",
            TabletType::Experimental => "experimental",
            TabletType::Backup => "backup",
            TabletType::Restore => "restore",
            TabletType::Worker => "worker",
            TabletType::Scrap => "scrap",
        }
    }

    /// Whether a tablet of this type serves queries.
    pub fn is_serving(&self) -> bool {
        matches!(
            self,
            TabletType::Primary | TabletType::Replica | TabletType::Rdonly
        )
    }
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TabletType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        TabletType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown tablet type: {}", s))
    }
}

// ---------------------------------------------------------------------------
// RemoteEndpoint
// ---------------------------------------------------------------------------

/// A single managed node: its alias plus the `host:port` its agent listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteEndpoint {
    pub alias: TabletAlias,
    pub addr: String,
}

impl RemoteEndpoint {
    pub fn new(alias: TabletAlias, addr: impl Into<String>) -> Self {
        Self {
            alias,
            addr: addr.into(),
        }
    }

    /// The URI used to dial the endpoint's gRPC server.
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.alias, self.addr)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
