//! MongoDB-backed coordination stores.
//!
//! `MongoConnection` owns the pooled client and the index bootstrap; each
//! store wraps one typed collection.

pub mod agent_registry;
pub mod checkpoint_store;
pub mod connection;
pub mod message_store;
pub mod sandbox_store;
pub mod task_store;

pub use agent_registry::AgentRegistry;
pub use checkpoint_store::CheckpointStore;
pub use connection::MongoConnection;
pub use message_store::MessageStore;
pub use sandbox_store::SandboxStore;
pub use task_store::TaskStore;

/// Handles to all five stores, cloned freely across tasks.
#[derive(Clone)]
pub struct Stores {
    pub agents: AgentRegistry,
    pub messages: MessageStore,
    pub checkpoints: CheckpointStore,
    pub tasks: TaskStore,
    pub sandboxes: SandboxStore,
}

impl Stores {
    pub fn new(conn: &MongoConnection) -> Self {
        Self {
            agents: AgentRegistry::new(conn.agents()),
            messages: MessageStore::new(conn.messages()),
            checkpoints: CheckpointStore::new(conn.checkpoints()),
            tasks: TaskStore::new(conn.tasks()),
            sandboxes: SandboxStore::new(conn.sandboxes()),
        }
    }
}
