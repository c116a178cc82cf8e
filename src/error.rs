use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = ModemError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ModemError {
    #[error("unable to open {port} at {baud} baud")]
    Connection {
        port: String,
        baud: u32,
        #[source]
        source: io::Error,
    },
    #[error("serial link i/o failed")]
    Io(#[from] io::Error),
    #[error("no reply to `{command}` within {waited:?}")]
    Timeout {
        command: String,
        waited: Duration,
    },
    #[error("unexpected reply {reply:?}; expected {expected}")]
    Parse {
        reply: String,
        expected: &'static str,
    },
    #[error("invalid {parameter} `{value}`: {allowed}")]
    Validation {
        parameter: &'static str,
        value: String,
        allowed: &'static str,
    },
    #[error("modem link is closed")]
    InvalidState,
    #[error("modem rejected `{command}`: {reply}")]
    Rejected {
        command: String,
        reply: String,
    },
}

impl ModemError {
    pub(crate) fn validation(parameter: &'static str, value: impl ToString, allowed: &'static str) -> Self {
        Self::Validation {
            parameter,
            value: value.to_string(),
            allowed,
        }
    }
}
