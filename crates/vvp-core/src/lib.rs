pub mod config;
pub mod deployments;
pub mod error;
pub mod flink_config;
pub mod http;
pub mod merge;
pub mod parameters;
pub mod poll;
pub mod session;
pub mod sql;
pub mod types;

pub use config::VvpConfig;
pub use deployments::{
    build_deployment_request, make_deployment, DeploymentHandle, DeploymentOptions, DeploymentRequest,
    JobOutcome,
};
pub use error::{Result, VvpError};
pub use parameters::DeploymentParameters;
pub use session::{HttpSession, VvpSession};
