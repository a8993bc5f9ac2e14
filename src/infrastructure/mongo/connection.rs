//! MongoDB connection lifecycle.
//!
//! One `MongoConnection` per process owns the pooled client. Index creation
//! is idempotent and runs at startup, so every deployment carries the
//! indexes the coordination queries rely on.

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::info;

use crate::domain::error::StoreError;
use crate::domain::models::{AgentRecord, Checkpoint, Message, SandboxRecord, Task};

pub const AGENTS: &str = "agents";
pub const MESSAGES: &str = "messages";
pub const CHECKPOINTS: &str = "checkpoints";
pub const TASKS: &str = "tasks";
pub const SANDBOXES: &str = "sandboxes";

/// Pooled connection to the coordination database.
#[derive(Clone)]
pub struct MongoConnection {
    client: Client,
    db: Database,
}

impl MongoConnection {
    /// Connect and verify reachability with a ping.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("squad".to_string());

        let client = Client::with_options(options)?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }).await?;

        info!(db = db_name, "connected to MongoDB");
        Ok(Self { client, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn agents(&self) -> Collection<AgentRecord> {
        self.db.collection(AGENTS)
    }

    pub fn messages(&self) -> Collection<Message> {
        self.db.collection(MESSAGES)
    }

    pub fn checkpoints(&self) -> Collection<Checkpoint> {
        self.db.collection(CHECKPOINTS)
    }

    pub fn tasks(&self) -> Collection<Task> {
        self.db.collection(TASKS)
    }

    pub fn sandboxes(&self) -> Collection<SandboxRecord> {
        self.db.collection(SANDBOXES)
    }

    /// Create every index the stores depend on. Safe to call repeatedly.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = IndexOptions::builder().unique(true).build();

        self.agents()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "agentId": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.agents()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "status": 1, "lastHeartbeat": 1 })
                    .build(),
            )
            .await?;

        self.messages()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "messageId": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.messages()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "toAgent": 1, "readAt": 1, "createdAt": 1 })
                    .build(),
            )
            .await?;
        self.messages()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "threadId": 1, "createdAt": 1 })
                    .build(),
            )
            .await?;

        self.checkpoints()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "checkpointId": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.checkpoints()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "agentId": 1, "createdAt": -1 })
                    .build(),
            )
            .await?;

        self.tasks()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "taskId": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.tasks()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "assignedTo": 1, "status": 1 })
                    .build(),
            )
            .await?;

        self.sandboxes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "sandboxId": 1, "agentId": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;
        self.sandboxes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "status": 1, "lifecycle.lastHeartbeat": 1 })
                    .build(),
            )
            .await?;

        Ok(())
    }

    /// Close the client pool. Should be the last storage call of the process.
    pub async fn close(self) {
        self.client.shutdown().await;
    }
}
