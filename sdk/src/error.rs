//! Error types for the workspace SDK
//!
//! Every non-success response from the server carries an [`ErrorEnvelope`].
//! It is translated into a typed [`Error`] by [`Error::from_envelope`] before
//! it reaches the caller.

use serde::Deserialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Code used when the server answered with something that is not an envelope
pub const UNKNOWN_ERROR_CODE: u32 = 1000;

/// Wire representation of a server error
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Main error type for the workspace SDK
#[derive(Debug, Error)]
pub enum Error {
    // Application errors translated from the server envelope
    #[error("{message}")]
    SandboxNotFound {
        sandbox_id: String,
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    TemplateNotFound {
        template: String,
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    FileNotFound {
        path: String,
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    PermissionDenied {
        path: String,
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    ProcessTimeout {
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    PtyNotFound {
        pty_id: String,
        message: String,
        details: Option<String>,
    },

    #[error("{message}")]
    AgentNotConnected {
        sandbox_id: String,
        message: String,
        details: Option<String>,
    },

    #[error("{message} (code: {code})")]
    Api {
        code: u32,
        message: String,
        details: Option<String>,
    },

    // Transport errors
    #[error("Connection error to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    // Client-side errors
    #[error("Terminal session is closed")]
    SessionClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sandbox {sandbox_id} failed: {message}")]
    SandboxFailed { sandbox_id: String, message: String },

    #[error("Timed out waiting for {0}")]
    WaitTimeout(String),

    #[error("Process execution failed: {0}")]
    ProcessExecution(String),

    #[error("Command '{command}' in sandbox {sandbox_id} exited with code {exit_code}: {stderr}")]
    ProcessFailed {
        sandbox_id: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },
}

impl Error {
    /// Translate a wire error envelope into a typed error.
    ///
    /// Typed fields are recovered by stripping the server's message prefix;
    /// when the prefix is missing the raw message is used as the field.
    pub fn from_envelope(envelope: ErrorEnvelope) -> Self {
        let ErrorEnvelope {
            code,
            message,
            details,
        } = envelope;

        match code {
            2001 => Error::SandboxNotFound {
                sandbox_id: strip_prefix(&message, "Sandbox not found: "),
                message,
                details,
            },
            2003 => Error::TemplateNotFound {
                template: strip_prefix(&message, "Template not found: "),
                message,
                details,
            },
            3001 => Error::FileNotFound {
                path: strip_prefix(&message, "File not found: "),
                message,
                details,
            },
            3003 => Error::PermissionDenied {
                path: strip_prefix(&message, "Permission denied: "),
                message,
                details,
            },
            4002 => Error::ProcessTimeout { message, details },
            4101 => Error::PtyNotFound {
                pty_id: strip_prefix(&message, "PTY not found: "),
                message,
                details,
            },
            5001 => Error::AgentNotConnected {
                sandbox_id: strip_prefix(&message, "Agent not connected for sandbox: "),
                message,
                details,
            },
            _ => Error::Api {
                code,
                message,
                details,
            },
        }
    }

    /// Translate an error response body.
    ///
    /// Bodies that are not an envelope become a generic error carrying the
    /// body text, or the status reason when the body is empty.
    pub fn from_response_body(status: reqwest::StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::from_envelope(envelope),
            Err(_) => {
                let message = if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                } else {
                    body.trim().to_string()
                };
                Error::Api {
                    code: UNKNOWN_ERROR_CODE,
                    message,
                    details: None,
                }
            }
        }
    }

    /// Client-side deadline for a command elapsed
    pub(crate) fn process_timeout() -> Self {
        Error::ProcessTimeout {
            message: "Process timeout".to_string(),
            details: None,
        }
    }

    /// Get the server error code, if this error came from the server
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::SandboxNotFound { .. } => Some(2001),
            Error::TemplateNotFound { .. } => Some(2003),
            Error::FileNotFound { .. } => Some(3001),
            Error::PermissionDenied { .. } => Some(3003),
            Error::ProcessTimeout { .. } => Some(4002),
            Error::PtyNotFound { .. } => Some(4101),
            Error::AgentNotConnected { .. } => Some(5001),
            Error::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get the server message, if this error came from the server
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::SandboxNotFound { message, .. }
            | Error::TemplateNotFound { message, .. }
            | Error::FileNotFound { message, .. }
            | Error::PermissionDenied { message, .. }
            | Error::ProcessTimeout { message, .. }
            | Error::PtyNotFound { message, .. }
            | Error::AgentNotConnected { message, .. }
            | Error::Api { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Get the server details, if any
    pub fn details(&self) -> Option<&str> {
        match self {
            Error::SandboxNotFound { details, .. }
            | Error::TemplateNotFound { details, .. }
            | Error::FileNotFound { details, .. }
            | Error::PermissionDenied { details, .. }
            | Error::ProcessTimeout { details, .. }
            | Error::PtyNotFound { details, .. }
            | Error::AgentNotConnected { details, .. }
            | Error::Api { details, .. } => details.as_deref(),
            _ => None,
        }
    }

    /// Check if the error means the addressed resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::SandboxNotFound { .. }
            | Error::TemplateNotFound { .. }
            | Error::FileNotFound { .. }
            | Error::PtyNotFound { .. } => true,
            // ProcessNotFound, WorkspaceNotFound
            Error::Api { code, .. } => matches!(code, 4001 | 7001),
            _ => false,
        }
    }

    /// Check if the error is a timeout of any layer
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::ProcessTimeout { .. } | Error::WaitTimeout(_) => true,
            Error::Connection { source, .. } | Error::Http(source) => source.is_timeout(),
            // AgentConnectionTimeout
            Error::Api { code, .. } => *code == 5002,
            _ => false,
        }
    }
}

fn strip_prefix(message: &str, prefix: &str) -> String {
    message.strip_prefix(prefix).unwrap_or(message).to_string()
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}
