//! Fleet configuration parsing and validation.
//!
//! Every option has a documented default so an empty TOML document (or no
//! file at all) yields a usable configuration matching the classic
//! "15 notebook servers on ports 8000+" classroom setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Symbols available to a token character (`[A-Za-z0-9]`).
const TOKEN_ALPHABET_SIZE: u128 = 62;

/// What to do when a session's port is already bound before launch.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OccupiedPortPolicy {
    /// Fail that user's launch without spawning anything.
    #[default]
    Reject,
    /// Spawn anyway and let the executable fail on its own.
    Attempt,
}

/// How the launcher decides a freshly spawned session is ready.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessMode {
    /// Poll a TCP connect to the session port until it succeeds or times out.
    #[default]
    Probe,
    /// Sleep for a fixed settling interval and assume the session is up.
    Settle,
}

/// Readiness wait settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Readiness strategy.
    pub mode: ReadinessMode,
    /// Fixed settling delay used by [`ReadinessMode::Settle`].
    pub settle_seconds: u64,
    /// Upper bound for [`ReadinessMode::Probe`].
    pub timeout_seconds: u64,
    /// Delay between two probe attempts.
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            mode: ReadinessMode::Probe,
            settle_seconds: 10,
            timeout_seconds: 30,
            poll_interval_ms: 250,
        }
    }
}

impl ReadinessConfig {
    /// Fixed settling delay.
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_seconds)
    }

    /// Probe deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Probe polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// The external compute-session executable and its argument templates.
///
/// Each argument may contain the placeholders `{host}`, `{port}`, `{token}`
/// and `{workspace}`; they are substituted per session at launch time.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct ExecutableConfig {
    /// Program name or path (resolved through `PATH`).
    pub program: String,
    /// Argument templates.
    pub args: Vec<String>,
}

impl Default for ExecutableConfig {
    fn default() -> Self {
        Self {
            program: "jupyter".into(),
            args: vec![
                "notebook".into(),
                "--ip={host}".into(),
                "--no-browser".into(),
                "--port={port}".into(),
                "--NotebookApp.token={token}".into(),
                "--notebook-dir={workspace}".into(),
            ],
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("base")
}

fn default_template_path() -> PathBuf {
    PathBuf::from("template")
}

fn default_users() -> u32 {
    15
}

fn default_user_prefix() -> String {
    "user".into()
}

fn default_base_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("jupyter_servers.csv")
}

fn default_signature() -> String {
    "jupyter-notebook".into()
}

fn default_token_length() -> usize {
    16
}

/// Fleet configuration parsed from an optional `fleet.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FleetConfig {
    /// Directory holding one workspace per user.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// Template directory copied into every workspace.
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
    /// Number of users in the fleet.
    #[serde(default = "default_users")]
    pub users: u32,
    /// Prefix of generated user identifiers (`user1`, `user2`, ...).
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    /// Port of the first session; session `i` binds `base_port + i`.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Bind address passed to every session.
    #[serde(default = "default_host")]
    pub host: String,
    /// Host used in published URLs; defaults to `host`.
    #[serde(default)]
    pub public_host: Option<String>,
    /// Session table (`User,Token,URL`) written by a launch run.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// Ownership ledger path; defaults to `<output_path>.owners.jsonl`.
    #[serde(default)]
    pub ownership_path: Option<PathBuf>,
    /// Substring identifying session processes for the signature sweep.
    #[serde(default = "default_signature")]
    pub signature: String,
    /// Length of generated access tokens.
    #[serde(default = "default_token_length")]
    pub token_length: usize,
    /// Behaviour when a session port is already bound.
    #[serde(default)]
    pub occupied_ports: OccupiedPortPolicy,
    /// When set, session stdout/stderr go to `<dir>/<user>.log`.
    #[serde(default)]
    pub session_log_dir: Option<PathBuf>,
    /// External executable settings.
    #[serde(default)]
    pub executable: ExecutableConfig,
    /// Readiness wait settings.
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            template_path: default_template_path(),
            users: default_users(),
            user_prefix: default_user_prefix(),
            base_port: default_base_port(),
            host: default_host(),
            public_host: None,
            output_path: default_output_path(),
            ownership_path: None,
            signature: default_signature(),
            token_length: default_token_length(),
            occupied_ports: OccupiedPortPolicy::default(),
            session_log_dir: None,
            executable: ExecutableConfig::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// Called after parsing and again after command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 {
            return Err(AppError::Config("users must be greater than zero".into()));
        }

        if self.token_length == 0 {
            return Err(AppError::Config(
                "token_length must be greater than zero".into(),
            ));
        }

        // Distinct tokens must exist for every user: 62^token_length >= users.
        let token_space = u32::try_from(self.token_length)
            .ok()
            .and_then(|len| TOKEN_ALPHABET_SIZE.checked_pow(len));
        if token_space.is_some_and(|space| space < u128::from(self.users)) {
            return Err(AppError::Config(format!(
                "token_length {} cannot give {} users distinct tokens",
                self.token_length, self.users
            )));
        }

        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        let last_port = u64::from(self.base_port) + u64::from(self.users) - 1;
        if last_port > u64::from(u16::MAX) {
            return Err(AppError::Config(format!(
                "port range {}..={last_port} exceeds {}",
                self.base_port,
                u16::MAX
            )));
        }

        if self.executable.program.trim().is_empty() {
            return Err(AppError::Config(
                "executable.program must not be empty".into(),
            ));
        }

        if !self.executable.args.iter().any(|arg| arg.contains("{port}")) {
            return Err(AppError::Config(
                "executable.args must pass {port} to the session".into(),
            ));
        }

        if self.readiness.mode == ReadinessMode::Probe
            && (self.readiness.timeout_seconds == 0 || self.readiness.poll_interval_ms == 0)
        {
            return Err(AppError::Config(
                "readiness probe needs non-zero timeout_seconds and poll_interval_ms".into(),
            ));
        }

        Ok(())
    }

    /// User identifiers in enumeration (and launch) order.
    #[must_use]
    pub fn user_ids(&self) -> Vec<String> {
        (1..=self.users)
            .map(|n| format!("{}{n}", self.user_prefix))
            .collect()
    }

    /// Workspace directory of a user.
    #[must_use]
    pub fn workspace_dir(&self, user: &str) -> PathBuf {
        self.base_path.join(user)
    }

    /// Host used in published session URLs; the bind host unless
    /// `public_host` is set.
    #[must_use]
    pub fn public_host(&self) -> &str {
        self.public_host.as_deref().unwrap_or(&self.host)
    }

    /// Path of the ownership ledger companion to the session table.
    #[must_use]
    pub fn ownership_path(&self) -> PathBuf {
        self.ownership_path.clone().unwrap_or_else(|| {
            let mut name = self.output_path.clone().into_os_string();
            name.push(".owners.jsonl");
            PathBuf::from(name)
        })
    }
}
