//! Basic sandbox and process usage
//!
//! Run: WORKSPACE_API_URL=http://localhost:8080 cargo run --example basic

use std::collections::HashMap;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_sdk::{CreateSandboxParams, RunCommandOptions, SandboxState, WorkspaceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let client = WorkspaceClient::from_env()?;
    let health = client.health().await?;
    println!("Server: {} ({:?})", health.status, health.version);

    let workspace_id = std::env::var("WORKSPACE_ID").unwrap_or_else(|_| "default".to_string());
    let sandbox = client
        .sandbox()
        .create(CreateSandboxParams {
            name: Some("example-sandbox".to_string()),
            metadata: Some(HashMap::from([("purpose".to_string(), "demo".to_string())])),
            ..CreateSandboxParams::new(workspace_id)
        })
        .await?;
    println!("Created sandbox {} ({})", sandbox.id, sandbox.state);

    let sandbox = client
        .sandbox()
        .wait_for_state(
            &sandbox.id,
            SandboxState::Running,
            Duration::from_secs(1),
            Duration::from_secs(120),
        )
        .await?;

    let outcome = run_commands(&client, &sandbox.id).await;

    client.sandbox().delete(&sandbox.id, true).await?;
    println!("Deleted sandbox {}", sandbox.id);
    outcome
}

async fn run_commands(client: &WorkspaceClient, sandbox_id: &str) -> anyhow::Result<()> {
    let result = client
        .process()
        .run(
            sandbox_id,
            "echo",
            RunCommandOptions::new().args(["Hello", "from", "Rust!"]),
        )
        .await?;
    print!("echo: {}", result.stdout);

    let result = client
        .process()
        .run(
            sandbox_id,
            "bash",
            RunCommandOptions::new()
                .args(["-c", "echo \"User: $USER, App: $APP_NAME\""])
                .env("USER", "developer")
                .env("APP_NAME", "MyApp"),
        )
        .await?;
    print!("env: {}", result.stdout);

    let listing = client
        .process()
        .exec(sandbox_id, "ls", ["-la", "/workspace"])
        .await?;
    println!("workspace:\n{}", listing);

    let result = client
        .process()
        .shell(sandbox_id, "exit 3", HashMap::new())
        .await?;
    println!("exit 3 -> exit code {}", result.exit_code);

    Ok(())
}
