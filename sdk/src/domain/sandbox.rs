//! Sandbox domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sandbox state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Sandbox is being created
    Starting,
    /// Sandbox is running and ready
    Running,
    /// Sandbox is being stopped
    Stopping,
    /// Sandbox is stopped
    Stopped,
    /// Sandbox encountered an error
    Error,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxState::Starting => "starting",
            SandboxState::Running => "running",
            SandboxState::Stopping => "stopping",
            SandboxState::Stopped => "stopped",
            SandboxState::Error => "error",
        }
    }
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sandbox as reported by the server
#[derive(Debug, Clone, Deserialize)]
pub struct Sandbox {
    /// Unique identifier
    pub id: String,

    /// Workspace the sandbox is bound to
    #[serde(default)]
    pub workspace_id: Option<String>,

    /// Optional human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Template used to create this sandbox
    pub template: String,

    /// Current state
    pub state: SandboxState,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// NFS mount URL (if available)
    #[serde(default)]
    pub nfs_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Error message (if state is Error)
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Sandbox {
    /// Check if the sandbox is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SandboxState::Stopped | SandboxState::Error)
    }

    /// Check if the sandbox can accept commands
    pub fn is_ready(&self) -> bool {
        self.state == SandboxState::Running
    }
}

/// Parameters for creating a sandbox
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateSandboxParams {
    /// Workspace to bind the sandbox to
    pub workspace_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,

    /// Timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl CreateSandboxParams {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            ..Self::default()
        }
    }
}

/// List sandboxes response
#[derive(Debug, Deserialize)]
pub(crate) struct ListSandboxesResponse {
    #[serde(default)]
    pub sandboxes: Vec<Sandbox>,
}
