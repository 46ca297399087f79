//! Readiness wait for freshly spawned sessions.
//!
//! Sessions do not report readiness back to the controller. In probe mode
//! the session port is polled with TCP connects until one succeeds or the
//! deadline passes; in settle mode the controller sleeps for a fixed
//! interval. Both modes fail fast if the child has already exited.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{ReadinessConfig, ReadinessMode};
use crate::{AppError, Result};

/// Address to probe for a session bound to `bind_host`.
///
/// Wildcard binds are probed over loopback.
#[must_use]
pub fn probe_host(bind_host: &str) -> &str {
    match bind_host {
        "0.0.0.0" => "127.0.0.1",
        "::" | "[::]" => "::1",
        other => other,
    }
}

/// Block until the session on `port` is considered ready.
///
/// # Errors
///
/// Returns `AppError::Launch` if the child exits first or, in probe mode,
/// if nothing accepts connections before the deadline.
pub async fn wait_ready(
    child: &mut Child,
    bind_host: &str,
    port: u16,
    readiness: &ReadinessConfig,
) -> Result<()> {
    match readiness.mode {
        ReadinessMode::Settle => {
            tokio::time::sleep(readiness.settle()).await;
            ensure_running(child, port)
        }
        ReadinessMode::Probe => {
            probe(
                child,
                probe_host(bind_host),
                port,
                readiness.timeout(),
                readiness.poll_interval(),
            )
            .await
        }
    }
}

async fn probe(
    child: &mut Child,
    host: &str,
    port: u16,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        ensure_running(child, port)?;

        attempts += 1;
        if let Ok(Ok(_stream)) = tokio::time::timeout(interval, TcpStream::connect((host, port))).await
        {
            debug!(host, port, attempts, "session accepting connections");
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(AppError::Launch(format!(
                "session not accepting connections on {host}:{port} after {timeout:?}"
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

fn ensure_running(child: &mut Child, port: u16) -> Result<()> {
    match child.try_wait() {
        Ok(None) => Ok(()),
        Ok(Some(status)) => Err(AppError::Launch(format!(
            "session for port {port} exited early ({status})"
        ))),
        Err(err) => Err(AppError::Launch(format!(
            "cannot poll session for port {port}: {err}"
        ))),
    }
}
