use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for the driver core.
///
/// Image absence at a match site is deliberately NOT an error: `locate` and
/// `wait_for` report it as a plain negative result.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("device not connected")]
    NotConnected,

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("command failed: {message}")]
    Command { message: String },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unrecognized output format: {message}")]
    Parse { message: String },

    #[error("requested region has zero area after clamping to frame bounds")]
    InvalidRegion,

    #[error("{action} failed")]
    Action {
        action: String,
        #[source]
        source: Box<DriverError>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl DriverError {
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Wrap a transport failure with the name of the input action that
    /// triggered it.
    pub fn action(action: impl Into<String>, source: DriverError) -> Self {
        Self::Action {
            action: action.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
