use std::fmt;
use std::time::Duration;

use crate::{
    CANCELLED_MESSAGE, ERR_CACHE_EXPIRED, ERR_CACHE_MISSING, ERR_INVALID_OUTPUT, ERR_STEP,
    ERR_SUBPROCESS_FAILED, ERR_SUBPROCESS_NO_OUTPUT, ERR_SUBPROCESS_SIGNAL, ERR_TIMEOUT,
    ERR_TIMEOUT_HINT, UI_TWO_LINE, command_name, format_cmd_plain,
};

/// Every failure the broker can report.
///
/// `Cancelled` is the user backing out of a prompt or interrupting the login
/// flow. It is never wrapped with step context so the command surface can
/// turn it into a quiet exit.
#[derive(Debug)]
pub enum Error {
    Cancelled,
    Config(String),
    Validation(String),
    Prompt(String),
    CacheMissing {
        session: String,
    },
    CacheExpired {
        session: String,
    },
    Subprocess {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    Timeout {
        command: String,
        timeout: Duration,
    },
    InvalidOutput {
        command: String,
        detail: String,
    },
    Persist(String),
    Step {
        step: &'static str,
        source: Box<Error>,
    },
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Wraps the error with the name of the step that failed. `Cancelled`
    /// passes through unchanged.
    pub fn wrap(self, step: &'static str) -> Error {
        match self {
            Error::Cancelled => Error::Cancelled,
            other => Error::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error beneath any step context.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Step { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn message(&self) -> String {
        match self {
            Error::Cancelled => CANCELLED_MESSAGE.to_string(),
            Error::Config(message)
            | Error::Validation(message)
            | Error::Prompt(message)
            | Error::Persist(message) => message.clone(),
            Error::CacheMissing { session } => {
                crate::msg2(ERR_CACHE_MISSING, session, init_hint())
            }
            Error::CacheExpired { session } => {
                crate::msg2(ERR_CACHE_EXPIRED, session, init_hint())
            }
            Error::Subprocess {
                command,
                status,
                stderr,
            } => {
                let stderr = match stderr.trim() {
                    "" => ERR_SUBPROCESS_NO_OUTPUT,
                    trimmed => trimmed,
                };
                match status {
                    Some(code) => crate::msg3(ERR_SUBPROCESS_FAILED, command, code, stderr),
                    None => crate::msg2(ERR_SUBPROCESS_SIGNAL, command, stderr),
                }
            }
            Error::Timeout { command, timeout } => crate::msg2(
                UI_TWO_LINE,
                crate::msg1(ERR_TIMEOUT, timeout.as_secs()),
                crate::msg1(ERR_TIMEOUT_HINT, format_cmd_plain(command)),
            ),
            Error::InvalidOutput { command, detail } => {
                crate::msg2(ERR_INVALID_OUTPUT, command, detail)
            }
            Error::Step { step, source } => crate::msg2(ERR_STEP, step, source.message()),
        }
    }
}

fn init_hint() -> String {
    format_cmd_plain(&format!("{} init", command_name()))
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Step { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, Error>;
}

impl<T> StepExt<T> for Result<T, Error> {
    fn step(self, step: &'static str) -> Result<T, Error> {
        self.map_err(|err| err.wrap(step))
    }
}
