//! Error handling
//!
//! Run: WORKSPACE_API_URL=http://localhost:8080 WORKSPACE_SANDBOX_ID=<id> cargo run --example error_handling

use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_sdk::{Error, RunCommandOptions, WorkspaceClient};

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
    let sandbox_id = std::env::var("WORKSPACE_SANDBOX_ID")?;

    match client.sandbox().get("non-existent-sandbox-id").await {
        Err(Error::SandboxNotFound { sandbox_id, .. }) => {
            println!("not found, as expected: {}", sandbox_id)
        }
        Err(e) => println!("unexpected error [{:?}]: {}", e.code(), e),
        Ok(sandbox) => println!("unexpectedly found {}", sandbox.id),
    }

    // A non-zero exit is a result, not an error
    let result = client
        .process()
        .run(&sandbox_id, "bash", RunCommandOptions::new().args(["-c", "exit 42"]))
        .await?;
    println!("exit code {} (expected 42)", result.exit_code);

    // exec asks for success explicitly
    match client
        .process()
        .exec(&sandbox_id, "cat", ["/nonexistent/file.txt"])
        .await
    {
        Err(Error::ProcessFailed {
            exit_code, stderr, ..
        }) => print!("exec failed with {}: {}", exit_code, stderr),
        other => println!("unexpected: {:?}", other),
    }

    match client
        .process()
        .run(
            &sandbox_id,
            "sleep",
            RunCommandOptions::new()
                .arg("10")
                .timeout(Duration::from_secs(2)),
        )
        .await
    {
        Err(e) if e.is_timeout() => println!("timed out, as expected: {}", e),
        other => println!("unexpected: {:?}", other),
    }

    match client.pty().kill(&sandbox_id, "no-such-pty").await {
        Err(Error::PtyNotFound { pty_id, .. }) => println!("no terminal {}", pty_id),
        other => println!("unexpected: {:?}", other),
    }

    Ok(())
}
