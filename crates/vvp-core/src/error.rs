// crates/vvp-core/src/error.rs

use thiserror::Error;

use crate::merge::ParameterError;
use crate::session::TransportError;

pub const NO_DEFAULT_DEPLOYMENT_MESSAGE: &str = "no default deployment target configured";

#[derive(Error, Debug)]
pub enum VvpError {
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("query rejected by validator ({result}){}", detail_suffix(.details))]
    Validation {
        result: String,
        details: Option<String>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("timed out after {attempts} attempts waiting for deployment {deployment_id}")]
    Timeout {
        deployment_id: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deployment {deployment_id} reached state {state}{}", detail_suffix(.message))]
    DeploymentFailed {
        deployment_id: String,
        state: String,
        message: Option<String>,
    },

    #[error("unexpected response from platform: {0}")]
    Protocol(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VvpError {
    pub fn configuration(message: impl Into<String>) -> Self {
        VvpError::Configuration(message.into())
    }
}

fn detail_suffix(details: &Option<String>) -> String {
    match details {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, VvpError>;
