//! Process service

use std::collections::HashMap;

use reqwest::header::ACCEPT;
use reqwest::Method;
use tracing::{debug, info};

use crate::domain::types::{CommandResult, KillProcessRequest, RunCommandOptions, RunCommandRequest};
use crate::error::{Error, Result};
use crate::infra::http::HttpTransport;
use crate::service::stream::ProcessEventStream;

/// Signal sent by `kill` when none is given (SIGTERM)
pub const DEFAULT_KILL_SIGNAL: i32 = 15;

/// Process service for executing commands in sandboxes
#[derive(Clone)]
pub struct ProcessService {
    transport: HttpTransport,
    timeout_grace: std::time::Duration,
}

impl ProcessService {
    pub(crate) fn new(transport: HttpTransport, timeout_grace: std::time::Duration) -> Self {
        Self {
            transport,
            timeout_grace,
        }
    }

    /// Run a command and wait for completion.
    ///
    /// With a timeout set, the request is abandoned once the timeout plus
    /// the configured grace period has elapsed and
    /// [`Error::ProcessTimeout`] is returned. A non-zero exit code is not an
    /// error. The call is never retried.
    pub async fn run(
        &self,
        sandbox_id: &str,
        command: &str,
        opts: RunCommandOptions,
    ) -> Result<CommandResult> {
        info!(
            "Running command in sandbox {}: {} {:?}",
            sandbox_id, command, opts.args
        );

        let path = format!("/sandboxes/{}/process/run", sandbox_id);
        let body = RunCommandRequest::new(command, &opts);

        match opts.timeout {
            Some(timeout) => {
                let request = self.transport.raw_request(Method::POST, &path).json(&body);
                let deadline = timeout + self.timeout_grace;
                tokio::time::timeout(deadline, self.transport.send_json(request))
                    .await
                    .map_err(|_| {
                        debug!(
                            "Command in sandbox {} exceeded {:?}, abandoning request",
                            sandbox_id, deadline
                        );
                        Error::process_timeout()
                    })?
            }
            None => self.transport.post(&path, &body).await,
        }
    }

    /// Run a command and stream its output.
    ///
    /// Each call starts a new remote execution. Dropping the returned stream
    /// before the terminal event closes the connection.
    pub async fn run_stream(
        &self,
        sandbox_id: &str,
        command: &str,
        opts: RunCommandOptions,
    ) -> Result<ProcessEventStream> {
        info!(
            "Running streamed command in sandbox {}: {} {:?}",
            sandbox_id, command, opts.args
        );

        let args = serde_json::to_string(&opts.args)?;
        let env = serde_json::to_string(&opts.env)?;
        let mut query: Vec<(&str, String)> = vec![
            ("command", command.to_string()),
            ("args", args),
            ("env", env),
        ];
        if let Some(cwd) = &opts.cwd {
            query.push(("cwd", cwd.clone()));
        }
        if let Some(timeout_ms) = opts.timeout_ms() {
            query.push(("timeout", timeout_ms.to_string()));
        }

        let path = format!("/sandboxes/{}/process/run/stream", sandbox_id);
        let request = self
            .transport
            .raw_request(Method::GET, &path)
            .header(ACCEPT, "text/event-stream")
            .query(&query);

        let response = self.transport.send(request).await?;
        Ok(ProcessEventStream::from_response(response))
    }

    /// Send a signal to a running process
    pub async fn kill(&self, sandbox_id: &str, pid: u32, signal: Option<i32>) -> Result<()> {
        let signal = signal.unwrap_or(DEFAULT_KILL_SIGNAL);
        info!(
            "Killing process {} in sandbox {} with signal {}",
            pid, sandbox_id, signal
        );

        let path = format!("/sandboxes/{}/process/{}/kill", sandbox_id, pid);
        self.transport
            .post_unit(&path, &KillProcessRequest { signal })
            .await
    }

    /// Run a command and return its stdout, failing on a non-zero exit code
    pub async fn exec<I, S>(&self, sandbox_id: &str, command: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let result = self
            .run(sandbox_id, command, RunCommandOptions::new().args(args))
            .await?;

        if !result.success() {
            return Err(Error::ProcessFailed {
                sandbox_id: sandbox_id.to_string(),
                command: command.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }

        Ok(result.stdout)
    }

    /// Run a script through `bash -c`
    pub async fn shell(
        &self,
        sandbox_id: &str,
        script: &str,
        env: HashMap<String, String>,
    ) -> Result<CommandResult> {
        let opts = RunCommandOptions {
            args: vec!["-c".to_string(), script.to_string()],
            env,
            ..Default::default()
        };
        self.run(sandbox_id, "bash", opts).await
    }
}
