//! Error types
use std::{fmt, io, net::SocketAddr, result};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error connecting to the device: {0}")]
    IO(#[from] io::Error),
    #[error("Could not parse the response received from the device: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Response data error: ({}) {}", .0.err_code, .0.err_msg)]
    TPLink(#[from] SectionError),
    #[error("No response from {0} in time")]
    Timeout(SocketAddr),
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Unknown device {0}")]
    UnknownDevice(String),
    #[error("{0} is offline")]
    Offline(String),
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SectionError {
    pub err_code: i16,
    pub err_msg: String,
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.err_code, self.err_msg)
    }
}

impl std::error::Error for SectionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_error_display() {
        let err = Error::from(SectionError {
            err_code: -1,
            err_msg: String::from("module not support"),
        });

        assert_eq!("Response data error: (-1) module not support", err.to_string());
    }
}
