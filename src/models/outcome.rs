//! Per-user results of a fleet run.

use std::fmt::{Display, Formatter};

use crate::models::session::Session;
use crate::provision::ProvisionReport;
use crate::AppError;

/// Orchestration stage a per-user failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Workspace provisioning.
    Provision,
    /// Port check, spawn, or readiness wait.
    Launch,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provision => f.write_str("provision"),
            Self::Launch => f.write_str("launch"),
        }
    }
}

/// Result of driving one user through the run.
#[derive(Debug)]
pub enum UserOutcome {
    /// Workspace synced; no session was requested.
    Provisioned {
        /// User identifier.
        user: String,
        /// What the sync changed.
        report: ProvisionReport,
    },
    /// Session launched and recorded.
    Launched {
        /// User identifier.
        user: String,
        /// Session port.
        port: u16,
        /// Published connection URL.
        url: String,
    },
    /// The user was skipped; other users were unaffected.
    Failed {
        /// User identifier.
        user: String,
        /// Stage that failed.
        stage: Stage,
        /// Underlying cause.
        error: AppError,
    },
}

impl UserOutcome {
    /// User this outcome belongs to.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::Provisioned { user, .. }
            | Self::Launched { user, .. }
            | Self::Failed { user, .. } => user,
        }
    }

    /// Whether the user failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Everything a run produced, in user enumeration order.
#[derive(Debug)]
pub struct RunReport {
    /// Identifier written to the ownership ledger.
    pub run_id: String,
    /// One outcome per user.
    pub outcomes: Vec<UserOutcome>,
    /// Live sessions started by this run, in launch order.
    pub sessions: Vec<Session>,
}

impl RunReport {
    /// Number of sessions launched and recorded.
    #[must_use]
    pub fn launched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, UserOutcome::Launched { .. }))
            .count()
    }

    /// Number of users that failed at any stage.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// Failed users with their stage and cause.
    pub fn failures(&self) -> impl Iterator<Item = (&str, Stage, &AppError)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            UserOutcome::Failed { user, stage, error } => Some((user.as_str(), *stage, error)),
            _ => None,
        })
    }
}
