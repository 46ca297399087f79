//! Persistence layer modules.

pub mod ownership;
pub mod registry;
