#![forbid(unsafe_code)]

//! Provision per-user workspaces and supervise a fleet of notebook servers.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod ports;
pub mod process;
pub mod provision;

pub use config::FleetConfig;
pub use errors::{AppError, Result};
