//! Session model and its persisted projections.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Child;

use crate::credentials::AccessToken;

/// Build the operator-facing URL of a session.
#[must_use]
pub fn session_url(host: &str, port: u16, token: &AccessToken) -> String {
    format!("http://{host}:{port}/?token={token}")
}

/// One running compute session bound to a user, port, and token.
///
/// The child handle stays with whoever holds the session; dropping it does
/// not terminate the process.
#[derive(Debug)]
pub struct Session {
    /// Owning user identifier.
    pub user: String,
    /// Port the session listens on.
    pub port: u16,
    /// Access token required by the session.
    pub token: AccessToken,
    /// Connection URL handed to the user.
    pub url: String,
    /// Working directory of the session.
    pub workspace: PathBuf,
    /// OS process identifier, when the platform reported one.
    pub pid: Option<u32>,
    /// Handle of the spawned process.
    pub child: Child,
}

impl Session {
    /// Row written to the session table.
    #[must_use]
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            user: self.user.clone(),
            token: self.token.as_str().to_owned(),
            url: self.url.clone(),
        }
    }

    /// Line written to the ownership ledger for this session.
    #[must_use]
    pub fn ownership(&self, run_id: &str) -> OwnershipRecord {
        OwnershipRecord {
            run_id: run_id.to_owned(),
            user: self.user.clone(),
            port: self.port,
            pid: self.pid,
            launched_at: Utc::now(),
        }
    }
}

/// Persisted `User,Token,URL` projection of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// User identifier.
    #[serde(rename = "User")]
    pub user: String,
    /// Access token.
    #[serde(rename = "Token")]
    pub token: String,
    /// Connection URL.
    #[serde(rename = "URL")]
    pub url: String,
}

/// Which process a run started for which user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OwnershipRecord {
    /// Identifier of the launch run.
    pub run_id: String,
    /// User identifier.
    pub user: String,
    /// Session port.
    pub port: u16,
    /// OS process identifier.
    pub pid: Option<u32>,
    /// Launch timestamp.
    pub launched_at: DateTime<Utc>,
}
