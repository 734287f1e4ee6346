//! Blocking API
//!
//! Thin wrappers that drive the async services to completion on a private
//! runtime. Semantics are identical to the async API. None of these types
//! may be used from inside an async context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::ClientConfig;
use crate::domain::sandbox::{CreateSandboxParams, Sandbox, SandboxState};
use crate::domain::types::{CommandResult, HealthStatus, ProcessEvent, PtyOptions, RunCommandOptions};
use crate::error::{Error, Result};
use crate::service::pty::{CloseNotice, CloseReason, TerminalOutput};
use crate::service::stream::ProcessEventStream;

fn build_runtime() -> Result<Runtime> {
    // One worker keeps terminal readers running between blocking calls
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("workspace-sdk")
        .enable_all()
        .build()
        .map_err(|e| Error::InvalidConfig(format!("failed to start runtime: {}", e)))
}

/// Blocking client for the workspace server
#[derive(Clone)]
pub struct WorkspaceClient {
    inner: crate::WorkspaceClient,
    runtime: Arc<Runtime>,
}

impl WorkspaceClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(api_url))
    }

    pub fn from_env() -> Result<Self> {
        Self::with_config(ClientConfig::load())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let runtime = Arc::new(build_runtime()?);
        let inner = {
            let _guard = runtime.enter();
            crate::WorkspaceClient::with_config(config)?
        };
        Ok(Self { inner, runtime })
    }

    pub fn sandbox(&self) -> SandboxService {
        SandboxService {
            inner: self.inner.sandbox().clone(),
            runtime: self.runtime.clone(),
        }
    }

    pub fn process(&self) -> ProcessService {
        ProcessService {
            inner: self.inner.process().clone(),
            runtime: self.runtime.clone(),
        }
    }

    pub fn pty(&self) -> PtyService {
        PtyService {
            inner: self.inner.pty().clone(),
            runtime: self.runtime.clone(),
        }
    }

    pub fn health(&self) -> Result<HealthStatus> {
        self.runtime.block_on(self.inner.health())
    }
}

/// Blocking sandbox service
pub struct SandboxService {
    inner: crate::SandboxService,
    runtime: Arc<Runtime>,
}

impl SandboxService {
    pub fn create(&self, params: CreateSandboxParams) -> Result<Sandbox> {
        self.runtime.block_on(self.inner.create(params))
    }

    pub fn get(&self, sandbox_id: &str) -> Result<Sandbox> {
        self.runtime.block_on(self.inner.get(sandbox_id))
    }

    pub fn list(&self, state: Option<SandboxState>) -> Result<Vec<Sandbox>> {
        self.runtime.block_on(self.inner.list(state))
    }

    pub fn delete(&self, sandbox_id: &str, force: bool) -> Result<()> {
        self.runtime.block_on(self.inner.delete(sandbox_id, force))
    }

    pub fn exists(&self, sandbox_id: &str) -> Result<bool> {
        self.runtime.block_on(self.inner.exists(sandbox_id))
    }

    pub fn wait_for_state(
        &self,
        sandbox_id: &str,
        target: SandboxState,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Sandbox> {
        self.runtime.block_on(
            self.inner
                .wait_for_state(sandbox_id, target, poll_interval, timeout),
        )
    }
}

/// Blocking process service
pub struct ProcessService {
    inner: crate::ProcessService,
    runtime: Arc<Runtime>,
}

impl ProcessService {
    pub fn run(&self, sandbox_id: &str, command: &str, opts: RunCommandOptions) -> Result<CommandResult> {
        self.runtime.block_on(self.inner.run(sandbox_id, command, opts))
    }

    pub fn run_stream(
        &self,
        sandbox_id: &str,
        command: &str,
        opts: RunCommandOptions,
    ) -> Result<ProcessEventIter> {
        let stream = self
            .runtime
            .block_on(self.inner.run_stream(sandbox_id, command, opts))?;
        Ok(ProcessEventIter {
            stream: Some(stream),
            runtime: self.runtime.clone(),
        })
    }

    pub fn kill(&self, sandbox_id: &str, pid: u32, signal: Option<i32>) -> Result<()> {
        self.runtime.block_on(self.inner.kill(sandbox_id, pid, signal))
    }

    pub fn exec<I, S>(&self, sandbox_id: &str, command: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime.block_on(self.inner.exec(sandbox_id, command, args))
    }

    pub fn shell(
        &self,
        sandbox_id: &str,
        script: &str,
        env: HashMap<String, String>,
    ) -> Result<CommandResult> {
        self.runtime.block_on(self.inner.shell(sandbox_id, script, env))
    }
}

/// Iterator over the events of a streamed run.
///
/// Dropping it before the terminal event closes the connection.
pub struct ProcessEventIter {
    stream: Option<ProcessEventStream>,
    runtime: Arc<Runtime>,
}

impl ProcessEventIter {
    /// Drain the remaining events into a buffered result
    pub fn collect_output(mut self) -> Result<CommandResult> {
        match self.stream.take() {
            Some(stream) => self.runtime.block_on(stream.collect_output()),
            None => Err(Error::Protocol("event stream already consumed".to_string())),
        }
    }
}

impl Iterator for ProcessEventIter {
    type Item = Result<ProcessEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.stream.as_mut()?;
        let item = self.runtime.block_on(stream.next());
        if item.is_none() {
            self.stream = None;
        }
        item
    }
}

impl Drop for ProcessEventIter {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        self.stream.take();
    }
}

/// Blocking PTY service
pub struct PtyService {
    inner: crate::PtyService,
    runtime: Arc<Runtime>,
}

impl PtyService {
    pub fn create(&self, sandbox_id: &str, opts: PtyOptions) -> Result<TerminalSession> {
        let inner = self.runtime.block_on(self.inner.create(sandbox_id, opts))?;
        Ok(TerminalSession {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    pub fn resize(&self, sandbox_id: &str, pty_id: &str, cols: u16, rows: u16) -> Result<()> {
        self.runtime
            .block_on(self.inner.resize(sandbox_id, pty_id, cols, rows))
    }

    pub fn kill(&self, sandbox_id: &str, pty_id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.kill(sandbox_id, pty_id))
    }
}

/// Blocking terminal session. Dropping it kills the session.
pub struct TerminalSession {
    inner: crate::TerminalSession,
    runtime: Arc<Runtime>,
}

impl TerminalSession {
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn sandbox_id(&self) -> &str {
        self.inner.sandbox_id()
    }

    pub fn cols(&self) -> u16 {
        self.inner.cols()
    }

    pub fn rows(&self) -> u16 {
        self.inner.rows()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        self.runtime.block_on(self.inner.write(data))
    }

    pub fn write_str(&self, data: &str) -> Result<()> {
        self.runtime.block_on(self.inner.write_str(data))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.runtime.block_on(self.inner.resize(cols, rows))
    }

    pub fn kill(&self) -> Result<()> {
        self.runtime.block_on(self.inner.kill())
    }

    pub fn on_data(&self) -> TerminalReader {
        TerminalReader {
            output: self.inner.on_data(),
            runtime: self.runtime.clone(),
        }
    }

    pub fn on_close(&self) -> CloseWaiter {
        CloseWaiter {
            notice: self.inner.on_close(),
            runtime: self.runtime.clone(),
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(e) = self.runtime.block_on(self.inner.kill()) {
            debug!("Kill of dropped PTY {} failed: {}", self.inner.id(), e);
        }
    }
}

/// Blocking receiver of terminal output
pub struct TerminalReader {
    output: TerminalOutput,
    runtime: Arc<Runtime>,
}

impl TerminalReader {
    /// Next chunk of output; `None` once the session closed or the observer
    /// was replaced
    pub fn recv(&mut self) -> Option<Bytes> {
        let output = &mut self.output;
        self.runtime.block_on(output.recv())
    }

    /// Like `recv`, but gives up after `timeout`
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Bytes> {
        let output = &mut self.output;
        // The timer must be created on the runtime
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, output.recv()).await })
            .ok()
            .flatten()
    }
}

impl Iterator for TerminalReader {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.recv()
    }
}

/// Blocking wait for a terminal session to close
pub struct CloseWaiter {
    notice: CloseNotice,
    runtime: Arc<Runtime>,
}

impl CloseWaiter {
    pub fn wait(self) -> Option<CloseReason> {
        self.runtime.block_on(self.notice)
    }

    /// Wait up to `timeout`; `None` if the session is still open or the
    /// observer was replaced
    pub fn wait_timeout(self, timeout: Duration) -> Option<CloseReason> {
        let CloseWaiter { notice, runtime } = self;
        runtime
            .block_on(async move { tokio::time::timeout(timeout, notice).await })
            .ok()
            .flatten()
    }
}
