//! Fleet runs: provision and launch every user in enumeration order.
//!
//! Each user is an independent unit of work. A provisioning or launch
//! failure is logged with the user and stage, recorded as
//! [`UserOutcome::Failed`], and the loop moves on. Only losing the session
//! table or ownership ledger aborts the run, because launched sessions
//! could no longer be reported or cleaned up.

use std::collections::HashSet;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::FleetConfig;
use crate::credentials::{generate_token, AccessToken};
use crate::models::outcome::{RunReport, Stage, UserOutcome};
use crate::orchestrator::launcher::SessionLauncher;
use crate::persistence::ownership::OwnershipLedger;
use crate::persistence::registry::SessionRegistry;
use crate::{ports, provision, AppError, Result};

/// Sync every user's workspace from the template without launching.
#[must_use]
pub fn provision_fleet(config: &FleetConfig) -> RunReport {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("provision_fleet", run_id = %run_id, users = config.users);
    let _guard = span.enter();

    let outcomes = config
        .user_ids()
        .into_iter()
        .map(|user| {
            let workspace = config.workspace_dir(&user);
            match provision::provision(&config.template_path, &workspace) {
                Ok(report) => {
                    info!(
                        user = %user,
                        created = report.created,
                        files = report.files_copied,
                        dirs = report.dirs_created,
                        "provisioned"
                    );
                    UserOutcome::Provisioned { user, report }
                }
                Err(error) => {
                    error!(user = %user, stage = %Stage::Provision, %error, "user skipped");
                    UserOutcome::Failed {
                        user,
                        stage: Stage::Provision,
                        error,
                    }
                }
            }
        })
        .collect();

    RunReport {
        run_id,
        outcomes,
        sessions: Vec::new(),
    }
}

/// Launch one session per user, optionally provisioning each workspace first.
///
/// Rows are appended to the session table in launch order and flushed as
/// they are written; the ownership ledger receives the matching pid before
/// the table row.
///
/// # Errors
///
/// Returns `AppError::Registry` if the session table or ownership ledger
/// cannot be opened or written, and `AppError::Config` if a port falls
/// outside the valid range or no unused token can be drawn. Per-user
/// failures are reported in the returned [`RunReport`] instead.
pub async fn launch_fleet(config: &FleetConfig, provision_first: bool) -> Result<RunReport> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("launch_fleet", run_id = %run_id, users = config.users);
    launch_users(config, provision_first, run_id)
        .instrument(span)
        .await
}

async fn launch_users(
    config: &FleetConfig,
    provision_first: bool,
    run_id: String,
) -> Result<RunReport> {
    let launcher = SessionLauncher::from_config(config);
    let mut registry = SessionRegistry::open(&config.output_path)?;
    let mut ledger = OwnershipLedger::open(config.ownership_path())?;
    info!(table = %registry.path().display(), "session table opened");

    let mut issued = HashSet::new();
    let mut outcomes = Vec::new();
    let mut sessions = Vec::new();

    for (index, user) in config.user_ids().into_iter().enumerate() {
        let workspace = config.workspace_dir(&user);

        if provision_first {
            match provision::provision(&config.template_path, &workspace) {
                Ok(report) => info!(
                    user = %user,
                    created = report.created,
                    files = report.files_copied,
                    "provisioned"
                ),
                Err(error) => {
                    error!(user = %user, stage = %Stage::Provision, %error, "user skipped");
                    outcomes.push(UserOutcome::Failed {
                        user,
                        stage: Stage::Provision,
                        error,
                    });
                    continue;
                }
            }
        }

        let port = ports::allocate(config.base_port, index)?;
        let token = unique_token(config.token_length, &mut issued)?;

        let session = match launcher
            .launch(&user, &workspace, port, token, &config.host)
            .await
        {
            Ok(session) => session,
            Err(error) => {
                error!(user = %user, port, stage = %Stage::Launch, %error, "user skipped");
                outcomes.push(UserOutcome::Failed {
                    user,
                    stage: Stage::Launch,
                    error,
                });
                continue;
            }
        };
        info!(user = %user, port, pid = session.pid, "launched");

        ledger.append(&session.ownership(&run_id))?;
        registry.append(&session.record())?;
        info!(user = %user, row = registry.rows(), "recorded");

        outcomes.push(UserOutcome::Launched {
            user,
            port,
            url: session.url.clone(),
        });
        sessions.push(session);
    }

    registry.close()?;

    let report = RunReport {
        run_id,
        outcomes,
        sessions,
    };
    info!(
        launched = report.launched(),
        failed = report.failed(),
        "launch run finished"
    );
    Ok(report)
}

/// Draws allowed per token before the token space counts as exhausted.
const TOKEN_ATTEMPTS: usize = 1_000;

/// Draw a token that was not issued earlier in this run.
fn unique_token(length: usize, issued: &mut HashSet<AccessToken>) -> Result<AccessToken> {
    for _ in 0..TOKEN_ATTEMPTS {
        let token = generate_token(length);
        if issued.insert(token.clone()) {
            return Ok(token);
        }
        warn!("regenerating duplicate access token");
    }
    Err(AppError::Config(format!(
        "no unused token of length {length} after {TOKEN_ATTEMPTS} draws ({} issued)",
        issued.len()
    )))
}
