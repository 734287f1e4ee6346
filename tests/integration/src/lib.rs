//! Integration test library - common utilities
//!
//! Live tests only run when `WORKSPACE_TEST_URL` points at a server.

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_sdk::{ClientConfig, CreateSandboxParams, Sandbox, SandboxState, WorkspaceClient};

static TRACING: Once = Once::new();

/// Test configuration
pub struct TestConfig {
    pub base_url: String,
    pub workspace_id: String,
    pub template: Option<String>,
    pub client: WorkspaceClient,
    pub http: reqwest::Client,
}

impl TestConfig {
    /// Build from the environment, or `None` when no server is configured
    pub fn from_env() -> Option<Self> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("WORKSPACE_TEST_URL").ok()?;

        TRACING.call_once(|| {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_test_writer())
                .with(
                    EnvFilter::builder()
                        .with_default_directive(LevelFilter::INFO.into())
                        .from_env_lossy(),
                )
                .try_init();
        });

        // Use longer timeout for sandbox operations (agent connection can take time)
        let timeout_secs: u64 = std::env::var("WORKSPACE_TEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        let mut config = ClientConfig::new(base_url.clone())
            .with_request_timeout(Duration::from_secs(timeout_secs));
        if let Ok(key) = std::env::var("WORKSPACE_API_KEY") {
            config = config.with_api_key(key);
        }

        let client = WorkspaceClient::with_config(config).expect("Failed to create SDK client");
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Some(Self {
            base_url,
            workspace_id: std::env::var("WORKSPACE_TEST_WORKSPACE_ID")
                .unwrap_or_else(|_| "default".to_string()),
            template: std::env::var("WORKSPACE_BASE_IMAGE").ok(),
            client,
            http,
        })
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Create a uniquely named sandbox and wait until it runs
    pub async fn create_running_sandbox(&self, prefix: &str) -> Sandbox {
        let params = CreateSandboxParams {
            template: self.template.clone(),
            name: Some(format!("{}-{}", prefix, uuid::Uuid::new_v4())),
            timeout: Some(300),
            ..CreateSandboxParams::new(self.workspace_id.clone())
        };

        let sandbox = self
            .client
            .sandbox()
            .create(params)
            .await
            .expect("Failed to create sandbox");

        self.client
            .sandbox()
            .wait_for_state(
                &sandbox.id,
                SandboxState::Running,
                Duration::from_secs(1),
                Duration::from_secs(120),
            )
            .await
            .expect("Sandbox did not reach running state")
    }

    /// Helper to cleanup sandbox after test
    pub async fn cleanup_sandbox(&self, sandbox_id: &str) {
        let _ = self.client.sandbox().delete(sandbox_id, true).await;
    }
}

/// Skip the current test when no server is configured
#[macro_export]
macro_rules! live_config {
    () => {
        match $crate::TestConfig::from_env() {
            Some(config) => config,
            None => {
                eprintln!("WORKSPACE_TEST_URL not set, skipping");
                return;
            }
        }
    };
}
