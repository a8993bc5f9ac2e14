//! Services: the coordination core.

pub mod agent_loop;
pub mod event_bus;
pub mod runtime;
pub mod sandbox_orchestrator;
pub mod tools;
pub mod views;
pub mod watchers;

pub use agent_loop::{AgentLoop, LoopConfig, LoopOutcome, LoopStop, UsageTotals};
pub use event_bus::{Envelope, Event, EventBus};
pub use sandbox_orchestrator::{SandboxOrchestrator, SandboxStatusReport};
pub use tools::{CoordinationTools, ToolObserver};
pub use watchers::Watchers;
