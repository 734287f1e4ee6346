//! Common domain types

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Command result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Check if the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Process event types for streaming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    Stdout { data: String },
    Stderr { data: String },
    Exit { code: i32 },
    Error { message: String },
}

impl ProcessEvent {
    /// Check if no event may follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessEvent::Exit { .. } | ProcessEvent::Error { .. })
    }
}

/// Options for running a command
#[derive(Debug, Clone, Default)]
pub struct RunCommandOptions {
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Working directory
    pub cwd: Option<String>,
    /// Timeout (None = no timeout)
    pub timeout: Option<Duration>,
}

impl RunCommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Timeout as sent on the wire, in milliseconds
    pub(crate) fn timeout_ms(&self) -> Option<u64> {
        self.timeout
            .map(|t| t.as_millis().min(u64::MAX as u128) as u64)
            .filter(|ms| *ms > 0)
    }
}

/// Run command request body
#[derive(Debug, Serialize)]
pub(crate) struct RunCommandRequest<'a> {
    pub command: &'a str,
    pub args: &'a [String],
    pub env: &'a HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl<'a> RunCommandRequest<'a> {
    pub fn new(command: &'a str, opts: &'a RunCommandOptions) -> Self {
        Self {
            command,
            args: &opts.args,
            env: &opts.env,
            cwd: opts.cwd.as_deref(),
            timeout: opts.timeout_ms(),
        }
    }
}

/// Kill process request body
#[derive(Debug, Serialize)]
pub(crate) struct KillProcessRequest {
    pub signal: i32,
}

/// PTY options
#[derive(Debug, Clone, Serialize)]
pub struct PtyOptions {
    pub cols: u16,
    pub rows: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

impl PtyOptions {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            ..Self::default()
        }
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            shell: None,
            env: None,
        }
    }
}

/// PTY info returned when a terminal is allocated
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PtyInfo {
    pub id: String,
    pub cols: u16,
    pub rows: u16,
}

/// Resize PTY request body
#[derive(Debug, Serialize)]
pub(crate) struct ResizePtyRequest {
    pub cols: u16,
    pub rows: u16,
}

/// Health check response
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}
