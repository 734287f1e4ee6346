//! Workspace client

use crate::config::ClientConfig;
use crate::domain::types::HealthStatus;
use crate::error::Result;
use crate::infra::http::HttpTransport;
use crate::service::process::ProcessService;
use crate::service::pty::PtyService;
use crate::service::sandbox::SandboxService;

/// Client for the workspace server.
///
/// Cheap to clone; clones share one connection pool. Any number of runs,
/// streams and terminal sessions may be in flight at once.
#[derive(Clone)]
pub struct WorkspaceClient {
    transport: HttpTransport,
    sandbox: SandboxService,
    process: ProcessService,
    pty: PtyService,
}

impl WorkspaceClient {
    /// Create a client for the given server URL with default settings
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(api_url))
    }

    /// Create a client from configuration loaded from the environment
    pub fn from_env() -> Result<Self> {
        Self::with_config(ClientConfig::load())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;

        Ok(Self {
            sandbox: SandboxService::new(transport.clone()),
            process: ProcessService::new(transport.clone(), config.timeout_grace),
            pty: PtyService::new(
                transport.clone(),
                config.connect_timeout,
                config.pty_backlog_bytes,
            ),
            transport,
        })
    }

    pub fn sandbox(&self) -> &SandboxService {
        &self.sandbox
    }

    pub fn process(&self) -> &ProcessService {
        &self.process
    }

    pub fn pty(&self) -> &PtyService {
        &self.pty
    }

    /// Check if the server is healthy
    pub async fn health(&self) -> Result<HealthStatus> {
        self.transport.get("/health").await
    }
}

impl std::fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("api_url", &self.transport.url(""))
            .finish_non_exhaustive()
    }
}
