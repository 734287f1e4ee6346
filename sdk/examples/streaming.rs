//! Streaming command output
//!
//! Run: WORKSPACE_API_URL=http://localhost:8080 WORKSPACE_SANDBOX_ID=<id> cargo run --example streaming

use std::io::Write;

use futures::StreamExt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_sdk::{ProcessEvent, RunCommandOptions, WorkspaceClient};

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

    let mut events = client
        .process()
        .run_stream(
            &sandbox_id,
            "bash",
            RunCommandOptions::new().args([
                "-c",
                "for i in 1 2 3 4 5; do echo \"Line $i\"; echo \"tick $i\" >&2; sleep 0.5; done",
            ]),
        )
        .await?;

    while let Some(event) = events.next().await {
        match event? {
            ProcessEvent::Stdout { data } => {
                print!("[stdout] {}", data);
                std::io::stdout().flush()?;
            }
            ProcessEvent::Stderr { data } => eprint!("[stderr] {}", data),
            ProcessEvent::Exit { code } => println!("exited with code {}", code),
            ProcessEvent::Error { message } => println!("failed: {}", message),
        }
    }

    // Stop reading after the first line; the connection closes on drop
    let mut events = client
        .process()
        .run_stream(
            &sandbox_id,
            "bash",
            RunCommandOptions::new().args(["-c", "while true; do date; sleep 1; done"]),
        )
        .await?;
    if let Some(event) = events.next().await {
        println!("first event of endless command: {:?}", event?);
    }
    drop(events);

    let result = client
        .process()
        .run_stream(&sandbox_id, "uname", RunCommandOptions::new().arg("-a"))
        .await?
        .collect_output()
        .await?;
    print!("collected: {}", result.stdout);

    Ok(())
}
