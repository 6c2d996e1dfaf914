//! Application use cases / business logic

pub mod commands;
pub mod matcher;
pub mod orchestrator;
pub mod render;

pub use commands::{Command, CommandService, ParseError};
pub use matcher::{LlmMatcher, extract_json};
pub use orchestrator::{CycleError, CycleState, Orchestrator, OrchestratorConfig};
pub use render::{RenderConfig, Renderer, StatusInfo, StatusView, truncate_to_length};
