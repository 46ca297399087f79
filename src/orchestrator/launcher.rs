//! Compute-session launcher.
//!
//! Spawns one external session process per user with its bind host, port,
//! token, and workspace substituted into the configured argument templates.
//! The controller never reads the child's output: it goes to a per-user log
//! file when `session_log_dir` is set, otherwise to the null device. Children
//! are not killed when the controller exits.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{ExecutableConfig, FleetConfig, OccupiedPortPolicy, ReadinessConfig};
use crate::credentials::AccessToken;
use crate::models::session::{session_url, Session};
use crate::orchestrator::readiness;
use crate::ports;
use crate::{AppError, Result};

/// Substitute session values into argument templates.
#[must_use]
pub fn render_args(
    templates: &[String],
    host: &str,
    port: u16,
    token: &AccessToken,
    workspace: &Path,
) -> Vec<String> {
    let port = port.to_string();
    let workspace = workspace.to_string_lossy();
    templates
        .iter()
        .map(|template| {
            template
                .replace("{host}", host)
                .replace("{port}", &port)
                .replace("{token}", token.as_str())
                .replace("{workspace}", &workspace)
        })
        .collect()
}

/// Starts sessions according to the fleet configuration.
#[derive(Debug, Clone)]
pub struct SessionLauncher {
    executable: ExecutableConfig,
    readiness: ReadinessConfig,
    occupied_ports: OccupiedPortPolicy,
    public_host: String,
    log_dir: Option<PathBuf>,
}

impl SessionLauncher {
    /// Launcher using the executable, readiness, and port settings of `config`.
    #[must_use]
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            readiness: config.readiness.clone(),
            occupied_ports: config.occupied_ports,
            public_host: config.public_host().to_owned(),
            log_dir: config.session_log_dir.clone(),
        }
    }

    /// Spawn the session for `user` and wait until it is ready.
    ///
    /// `host` is the bind address; the returned URL uses
    /// [`FleetConfig::public_host`] instead.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the workspace is missing, the port is
    /// occupied under the `reject` policy, the executable cannot be spawned,
    /// or the readiness wait fails. A session that fails readiness is killed.
    pub async fn launch(
        &self,
        user: &str,
        workspace_dir: &Path,
        port: u16,
        token: AccessToken,
        host: &str,
    ) -> Result<Session> {
        let span = info_span!("launch", user, port);
        self.launch_inner(user, workspace_dir, port, token, host)
            .instrument(span)
            .await
    }

    async fn launch_inner(
        &self,
        user: &str,
        workspace_dir: &Path,
        port: u16,
        token: AccessToken,
        host: &str,
    ) -> Result<Session> {
        if !workspace_dir.is_dir() {
            return Err(AppError::Launch(format!(
                "workspace {} does not exist",
                workspace_dir.display()
            )));
        }

        if self.occupied_ports == OccupiedPortPolicy::Reject && !ports::is_port_free(host, port) {
            return Err(AppError::Launch(format!(
                "port {port} on {host} is already in use"
            )));
        }

        let args = render_args(&self.executable.args, host, port, &token, workspace_dir);
        let (stdout, stderr) = self.output_for(user)?;

        let mut child = Command::new(&self.executable.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false)
            .spawn()
            .map_err(|err| {
                AppError::Launch(format!(
                    "failed to spawn {}: {err}",
                    self.executable.program
                ))
            })?;

        let pid = child.id();
        info!(pid, program = %self.executable.program, "session process spawned");

        if let Err(err) = readiness::wait_ready(&mut child, host, port, &self.readiness).await {
            // Kill and reap so no half-started session outlives the error.
            if let Err(kill_err) = child.kill().await {
                warn!(pid, %kill_err, "could not kill unready session");
            }
            return Err(err);
        }

        Ok(Session {
            user: user.to_owned(),
            port,
            url: session_url(&self.public_host, port, &token),
            token,
            workspace: workspace_dir.to_path_buf(),
            pid,
            child,
        })
    }

    fn output_for(&self, user: &str) -> Result<(Stdio, Stdio)> {
        let Some(dir) = &self.log_dir else {
            return Ok((Stdio::null(), Stdio::null()));
        };

        let path = dir.join(format!("{user}.log"));
        let open = || -> std::io::Result<(File, File)> {
            fs::create_dir_all(dir)?;
            let out = File::create(&path)?;
            let err = out.try_clone()?;
            Ok((out, err))
        };
        let (out, err) = open().map_err(|err| {
            AppError::Launch(format!("cannot open session log {}: {err}", path.display()))
        })?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }
}
