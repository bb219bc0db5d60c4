use std::io;
use std::time::Duration;

use thiserror::Error;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Failure modes of the provisioning toolkit.
///
/// `Process` is the only variant a healthy steady state produces: it means
/// the bridge ran and reported a nonzero exit, and it carries everything
/// needed to diagnose the call without re-running it. An in-shell logical
/// failure (exit 0 with unhelpful output) is not an error at this layer.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("command `{command_line}` exited with code {exit_code}")]
    Process {
        command_line: String,
        exit_code: i32,
        output: String,
    },

    #[error("failed to launch `{command_line}`: {source}")]
    Launch {
        command_line: String,
        #[source]
        source: io::Error,
    },

    #[error("command `{command_line}` timed out after {timeout:?}")]
    Timeout {
        command_line: String,
        timeout: Duration,
    },

    #[error("{message} (waited {waited:?})")]
    Deadline { message: String, waited: Duration },

    #[error("file error: {message}")]
    File { message: String },

    #[error("database error: {source}")]
    Db {
        #[from]
        source: rusqlite::Error,
    },
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn file(message: impl Into<String>) -> Self {
        Self::File {
            message: message.into(),
        }
    }
}
