//! Interactive terminal session
//!
//! Run: WORKSPACE_API_URL=http://localhost:8080 WORKSPACE_SANDBOX_ID=<id> cargo run --example terminal

use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_sdk::{PtyOptions, WorkspaceClient};

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

    let session = client
        .pty()
        .create(&sandbox_id, PtyOptions::new(120, 40).env("TERM", "xterm-256color"))
        .await?;
    println!("attached to {} ({}x{})", session.id(), session.cols(), session.rows());

    let mut output = session.on_data();
    let closed = session.on_close();
    let printer = tokio::spawn(async move {
        while let Some(chunk) = output.recv().await {
            print!("{}", String::from_utf8_lossy(&chunk));
        }
    });

    session.write_str("ls -la\n").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    session.resize(100, 30).await?;
    session.write_str("stty size\n").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    session.kill().await?;
    println!("\nclosed: {:?}", closed.await);
    printer.await?;

    Ok(())
}
