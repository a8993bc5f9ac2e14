//! Domain models: the five collection schemas plus runtime configuration.

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod message;
pub mod sandbox;
pub mod task;

pub use agent::{
    is_uuid_shaped, AgentRecord, AgentSandboxStatus, AgentStatus, AgentType, Specialization,
    TokenUsage,
};
pub use checkpoint::{Checkpoint, CheckpointSummary, ResumePointer};
pub use config::{
    ClaudeConfig, Config, DirectorConfig, LoggingConfig, MongoConfig, SandboxConfig,
    SandboxProviderKind,
};
pub use message::{
    inbox_order, preview_of, Message, MessagePreview, MessagePriority, MessageType, PREVIEW_CHARS,
};
pub use sandbox::{
    SandboxCosts, SandboxLifecycle, SandboxMetadata, SandboxRecord, SandboxResources, SandboxState,
};
pub use task::{Task, TaskStatus};

/// BSON datetime (de)serialization for `Option<DateTime<Utc>>` fields.
/// The bson helpers only cover the non-optional case.
pub(crate) mod bson_datetime_opt {
    use bson::DateTime as BsonDateTime;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(BsonDateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<BsonDateTime>::deserialize(deserializer)?.map(BsonDateTime::to_chrono))
    }
}
