//! Elevo Workspace SDK
//!
//! Typed client for the workspace server: create sandboxes, run commands
//! in them (buffered or streamed) and attach interactive terminals.
//!
//! ```no_run
//! use futures::StreamExt;
//! use workspace_sdk::{ProcessEvent, RunCommandOptions, WorkspaceClient};
//!
//! # async fn demo() -> workspace_sdk::Result<()> {
//! let client = WorkspaceClient::new("http://127.0.0.1:8080")?;
//!
//! let result = client
//!     .process()
//!     .run("sb-1", "echo", RunCommandOptions::new().arg("hello"))
//!     .await?;
//! assert_eq!(result.stdout, "hello\n");
//!
//! let mut events = client
//!     .process()
//!     .run_stream("sb-1", "ls", RunCommandOptions::new().arg("-la"))
//!     .await?;
//! while let Some(event) = events.next().await {
//!     if let ProcessEvent::Stdout { data } = event? {
//!         print!("{}", data);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A blocking flavour of the same API lives in [`blocking`].

pub mod blocking;
mod client;
mod config;
mod domain;
mod error;
mod infra;
mod service;

pub use client::WorkspaceClient;
pub use config::ClientConfig;
pub use domain::sandbox::{CreateSandboxParams, Sandbox, SandboxState};
pub use domain::types::{
    CommandResult, HealthStatus, ProcessEvent, PtyInfo, PtyOptions, RunCommandOptions,
};
pub use error::{Error, ErrorEnvelope, Result, UNKNOWN_ERROR_CODE};
pub use service::process::{ProcessService, DEFAULT_KILL_SIGNAL};
pub use service::pty::{CloseNotice, CloseReason, PtyService, TerminalOutput, TerminalSession};
pub use service::sandbox::SandboxService;
pub use service::stream::ProcessEventStream;
