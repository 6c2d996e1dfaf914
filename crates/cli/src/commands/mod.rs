//! Subcommand implementations

pub mod config;
pub mod cycle;
pub mod doctor;
pub mod queue;
pub mod run;
pub mod status;
