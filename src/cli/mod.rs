//! Command-line interface.
//!
//! `squad serve` runs the control plane; `squad agent` is the in-sandbox
//! runtime entrypoint. Agent identity arrives as flags (UUID-shaped,
//! validated); the task body arrives only through `AGENT_TASK`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::domain::models::{is_uuid_shaped, AgentType, Specialization};
use crate::services::runtime::AgentArgs;

#[derive(Parser)]
#[command(
    name = "squad",
    about = "Multi-agent coordination runtime over a shared MongoDB plane",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the control-plane server (REST, WebSocket, watchers)
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the in-sandbox agent runtime
    Agent(AgentCliArgs),
}

/// Flags of the agent runtime contract.
#[derive(Args, Debug)]
pub struct AgentCliArgs {
    /// Agent identity (UUID)
    #[arg(long = "agentId")]
    pub agent_id: String,

    /// Agent role: director or specialist
    #[arg(long = "agentType")]
    pub agent_type: String,

    /// Specialist capability class
    #[arg(long)]
    pub specialization: Option<String>,

    /// Spawning director (UUID, specialists only)
    #[arg(long = "parentId")]
    pub parent_id: Option<String>,
}

impl AgentCliArgs {
    /// Validate the flags and read the task body from `AGENT_TASK`.
    pub fn into_agent_args(self) -> Result<AgentArgs> {
        if !is_uuid_shaped(&self.agent_id) {
            bail!("--agentId must be a UUID, got: {}", self.agent_id);
        }
        let agent_type = AgentType::parse_str(&self.agent_type)
            .with_context(|| format!("unknown --agentType: {}", self.agent_type))?;
        let specialization = match self.specialization.as_deref() {
            Some(s) => Some(
                Specialization::parse_str(s)
                    .with_context(|| format!("unknown --specialization: {s}"))?,
            ),
            None => None,
        };
        if let Some(parent_id) = &self.parent_id {
            if !is_uuid_shaped(parent_id) {
                bail!("--parentId must be a UUID, got: {parent_id}");
            }
        }
        let task = std::env::var("AGENT_TASK").context("AGENT_TASK must be set")?;

        Ok(AgentArgs {
            agent_id: self.agent_id,
            agent_type,
            specialization,
            parent_id: self.parent_id,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn args(agent_id: &str, agent_type: &str) -> AgentCliArgs {
        AgentCliArgs {
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            specialization: None,
            parent_id: None,
        }
    }

    #[test]
    fn test_cli_parses_agent_contract() {
        let cli = Cli::try_parse_from([
            "squad",
            "agent",
            "--agentId",
            "6a3b1f0e-8c8e-4a87-9d55-0a4a5b8f4e21",
            "--agentType",
            "specialist",
            "--specialization",
            "researcher",
            "--parentId",
            "7b4c2f1e-9d9f-4b98-8e66-1b5b6c9f5f32",
        ])
        .unwrap();

        match cli.command {
            Commands::Agent(agent) => {
                assert_eq!(agent.agent_type, "specialist");
                assert_eq!(agent.specialization.as_deref(), Some("researcher"));
            }
            _ => panic!("expected agent subcommand"),
        }
    }

    #[test]
    fn test_rejects_non_uuid_identity() {
        let bad = args("not-a-uuid", "director");
        assert!(bad.into_agent_args().is_err());

        let mut bad_parent = args(&Uuid::new_v4().to_string(), "specialist");
        bad_parent.parent_id = Some("; rm -rf /".to_string());
        assert!(bad_parent.into_agent_args().is_err());
    }

    #[test]
    fn test_rejects_unknown_enums() {
        let bad = args(&Uuid::new_v4().to_string(), "overmind");
        assert!(bad.into_agent_args().is_err());
    }
}
