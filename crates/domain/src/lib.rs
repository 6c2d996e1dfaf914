//! trendposter domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Matching, orchestration, chat commands and rendering
//! - `policy`: Publish decision and posting-hours window
//! - `retry`: Bounded exponential backoff shared by the orchestrator

pub mod model;
pub mod policy;
pub mod ports;
pub mod retry;
pub mod usecases;

pub use model::*;
pub use ports::*;
