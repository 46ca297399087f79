//! Session orchestration modules.
//!
//! Covers session launching and readiness, fleet runs over all users, and
//! fleet termination.

pub mod fleet;
pub mod launcher;
pub mod readiness;
pub mod terminator;
