//! Ports: trait seams between the coordination core and infrastructure.

pub mod llm;
pub mod sandbox;
pub mod tools;

pub use llm::LlmClient;
pub use sandbox::{CommandOutcome, CommandSpec, OutputHandler, OutputStream, SandboxProvider};
pub use tools::ToolHandler;
