//! Sandbox service

use std::time::Duration;

use reqwest::Method;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::domain::sandbox::{CreateSandboxParams, ListSandboxesResponse, Sandbox, SandboxState};
use crate::error::{Error, Result};
use crate::infra::http::HttpTransport;

/// Sandbox service for managing sandbox lifecycle
#[derive(Clone)]
pub struct SandboxService {
    transport: HttpTransport,
}

impl SandboxService {
    pub(crate) fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    /// Create a new sandbox bound to a workspace
    pub async fn create(&self, params: CreateSandboxParams) -> Result<Sandbox> {
        if params.workspace_id.is_empty() {
            return Err(Error::InvalidConfig("workspace_id is required".to_string()));
        }

        info!(
            "Creating sandbox in workspace {} (template: {:?})",
            params.workspace_id, params.template
        );
        self.transport.post("/sandboxes", &params).await
    }

    /// Get a sandbox by ID
    pub async fn get(&self, sandbox_id: &str) -> Result<Sandbox> {
        self.transport
            .get(&format!("/sandboxes/{}", sandbox_id))
            .await
    }

    /// List sandboxes, optionally filtered by state
    pub async fn list(&self, state: Option<SandboxState>) -> Result<Vec<Sandbox>> {
        let mut request = self.transport.request(Method::GET, "/sandboxes");
        if let Some(state) = state {
            request = request.query(&[("state", state.as_str())]);
        }

        let response: ListSandboxesResponse = self.transport.send_json(request).await?;
        Ok(response.sandboxes)
    }

    /// Delete a sandbox
    pub async fn delete(&self, sandbox_id: &str, force: bool) -> Result<()> {
        info!("Deleting sandbox {} (force: {})", sandbox_id, force);

        let mut request = self
            .transport
            .request(Method::DELETE, &format!("/sandboxes/{}", sandbox_id));
        if force {
            request = request.query(&[("force", "true")]);
        }

        self.transport.send(request).await?;
        Ok(())
    }

    /// Check if a sandbox exists
    pub async fn exists(&self, sandbox_id: &str) -> Result<bool> {
        match self.get(sandbox_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Poll until a sandbox reaches the target state
    pub async fn wait_for_state(
        &self,
        sandbox_id: &str,
        target: SandboxState,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Sandbox> {
        let deadline = Instant::now() + timeout;

        loop {
            let sandbox = self.get(sandbox_id).await?;
            if sandbox.state == target {
                return Ok(sandbox);
            }

            if sandbox.state == SandboxState::Error {
                return Err(Error::SandboxFailed {
                    sandbox_id: sandbox_id.to_string(),
                    message: sandbox
                        .error_message
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }

            if Instant::now() + poll_interval > deadline {
                return Err(Error::WaitTimeout(format!(
                    "sandbox {} to reach state {}",
                    sandbox_id, target
                )));
            }

            debug!(
                "Sandbox {} is {}, waiting for {}",
                sandbox_id, sandbox.state, target
            );
            sleep(poll_interval).await;
        }
    }
}
