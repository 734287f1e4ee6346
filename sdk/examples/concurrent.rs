//! Concurrent commands across sandboxes
//!
//! Run: WORKSPACE_API_URL=http://localhost:8080 WORKSPACE_SANDBOX_IDS=a,b,c cargo run --example concurrent

use std::time::Instant;

use tokio::task::JoinSet;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_sdk::{RunCommandOptions, WorkspaceClient};

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
    let sandbox_ids: Vec<String> = std::env::var("WORKSPACE_SANDBOX_IDS")?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for sandbox_id in sandbox_ids {
        for n in 0..3 {
            let client = client.clone();
            let sandbox_id = sandbox_id.clone();
            tasks.spawn(async move {
                let result = client
                    .process()
                    .run(
                        &sandbox_id,
                        "bash",
                        RunCommandOptions::new()
                            .arg("-c")
                            .arg(format!("sleep 1; echo job {} on $(hostname)", n)),
                    )
                    .await;
                (sandbox_id, result)
            });
        }
    }

    while let Some(joined) = tasks.join_next().await {
        let (sandbox_id, result) = joined?;
        match result {
            Ok(result) => print!("{}: {}", sandbox_id, result.stdout),
            Err(e) => println!("{}: failed: {}", sandbox_id, e),
        }
    }
    println!("all jobs finished in {:?}", started.elapsed());

    Ok(())
}
