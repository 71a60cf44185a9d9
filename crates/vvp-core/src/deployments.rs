// crates/vvp-core/src/deployments.rs

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, VvpError, NO_DEFAULT_DEPLOYMENT_MESSAGE};
use crate::flink_config::{inject_flink_config, FLINK_CONFIGURATION_PATH};
use crate::merge::{descend_or_create, merge, ParameterError, ParameterOverrides};
use crate::parameters::DeploymentParameters;
use crate::poll::{poll_until, PollError, PollPolicy};
use crate::session::{endpoints, VvpSession};
use crate::sql;
use crate::types::{Deployment, DeploymentDefaults, DeploymentState};

const ARTIFACT_PATH: [&str; 4] = ["spec", "template", "spec", "artifact"];
const MAX_NAME_CHARS: usize = 64;

/// A fully-formed body for `POST /deployments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeploymentRequest {
    body: Map<String, Value>,
}

impl DeploymentRequest {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    pub fn name(&self) -> Option<&str> {
        self.body
            .get("metadata")
            .and_then(|metadata| metadata.get("name"))
            .and_then(Value::as_str)
    }

    pub fn deployment_target_id(&self) -> Option<&str> {
        self.body
            .get("spec")
            .and_then(|spec| spec.get("deploymentTargetId"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentOptions {
    pub poll: PollPolicy,
    pub cancel: CancellationToken,
}

/// What became of the job behind a submitted deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Running { job_id: String },
    Terminal {
        state: DeploymentState,
        message: Option<String>,
    },
    TimedOut {
        attempts: u32,
        last_error: Option<String>,
    },
    Cancelled,
}

/// Result of a submission. The id is always present once the platform accepted the request.
#[derive(Debug, Clone)]
pub struct DeploymentHandle {
    pub deployment_id: String,
    pub job: JobOutcome,
    pub diagnostics: Vec<String>,
}

impl DeploymentHandle {
    pub fn job_id(&self) -> Option<&str> {
        match &self.job {
            JobOutcome::Running { job_id } => Some(job_id),
            _ => None,
        }
    }

    /// The job id, or the error describing why none was observed.
    pub fn require_job_id(&self) -> Result<&str> {
        match &self.job {
            JobOutcome::Running { job_id } => Ok(job_id),
            JobOutcome::Terminal { state, message } => Err(VvpError::DeploymentFailed {
                deployment_id: self.deployment_id.clone(),
                state: state.to_string(),
                message: message.clone(),
            }),
            JobOutcome::TimedOut {
                attempts,
                last_error,
            } => Err(VvpError::Timeout {
                deployment_id: self.deployment_id.clone(),
                attempts: *attempts,
                last_error: last_error.clone(),
            }),
            JobOutcome::Cancelled => Err(VvpError::Cancelled),
        }
    }
}

pub async fn fetch_deployment_defaults(session: &VvpSession) -> Result<DeploymentDefaults> {
    let raw: Value = session
        .get_json(&endpoints::deployment_defaults(session.namespace()))
        .await?;
    DeploymentDefaults::from_value(raw)
        .ok_or_else(|| VvpError::Protocol("deployment defaults response is not an object".to_string()))
}

pub async fn get_deployment(session: &VvpSession, deployment_id: &str) -> Result<Deployment> {
    session
        .get_json(&endpoints::deployment(session.namespace(), deployment_id))
        .await
}

/// Assembles the creation payload for `query` without submitting anything.
pub async fn build_deployment_request(
    query: &str,
    session: &VvpSession,
    parameters: &DeploymentParameters,
) -> Result<DeploymentRequest> {
    let defaults = fetch_deployment_defaults(session).await?;
    if defaults.deployment_target_id().is_none() {
        return Err(VvpError::configuration(NO_DEFAULT_DEPLOYMENT_MESSAGE));
    }

    let validation = sql::validate_sql(session, query).await?;
    if !validation.result.is_deployable() {
        return Err(VvpError::Validation {
            result: validation.raw_result,
            details: validation.error_message,
        });
    }

    reject_reserved_paths(&parameters.deployment)?;

    let mut body = base_request(&defaults, query);
    merge(&mut body, &parameters.deployment)?;
    if !parameters.flink.is_empty() {
        inject_flink_config(&mut body, &parameters.flink)?;
    }
    attach_query(&mut body, query)?;

    let request = DeploymentRequest { body };
    debug!(
        namespace = session.namespace(),
        name = request.name().unwrap_or_default(),
        overrides = parameters.deployment.len(),
        flink_settings = parameters.flink.len(),
        "Built deployment request"
    );
    Ok(request)
}

/// Builds, submits, and follows a deployment for `query` until its job id is known.
pub async fn make_deployment(
    query: &str,
    session: &VvpSession,
    parameters: &DeploymentParameters,
    options: &DeploymentOptions,
) -> Result<DeploymentHandle> {
    let request = build_deployment_request(query, session, parameters).await?;

    // Only metadata.id is read from the create reply.
    let created: Value = session
        .post_json(&endpoints::deployments(session.namespace()), &request)
        .await?;
    let deployment_id = created
        .pointer("/metadata/id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| VvpError::Protocol("created deployment has no metadata.id".to_string()))?;
    info!(deployment_id = %deployment_id, namespace = session.namespace(), "Deployment created");

    let mut diagnostics = Vec::new();
    match get_deployment(session, &deployment_id).await {
        Ok(deployment) => {
            for warning in deployment.warnings() {
                warn!(deployment_id = %deployment_id, warning = %warning, "Deployment reported a warning");
                diagnostics.push(warning);
            }
        }
        Err(err) => {
            warn!(deployment_id = %deployment_id, error = %err, "Could not fetch created deployment");
            diagnostics.push(format!("could not fetch created deployment: {err}"));
        }
    }

    let job = await_job(session, &deployment_id, options).await;
    Ok(DeploymentHandle {
        deployment_id,
        job,
        diagnostics,
    })
}

async fn await_job(session: &VvpSession, deployment_id: &str, options: &DeploymentOptions) -> JobOutcome {
    let polled = poll_until(
        &options.poll,
        &options.cancel,
        move || get_deployment(session, deployment_id),
        |deployment: &Deployment| {
            deployment.job_id().is_some() || deployment.state().is_some_and(DeploymentState::is_terminal)
        },
    )
    .await;

    match polled {
        Ok(deployment) => match deployment.job_id() {
            Some(job_id) => {
                info!(deployment_id, job_id, "Deployment job running");
                JobOutcome::Running {
                    job_id: job_id.to_string(),
                }
            }
            None => {
                let state = deployment
                    .state()
                    .cloned()
                    .unwrap_or_else(|| DeploymentState::Other("UNKNOWN".to_string()));
                let message = deployment.status.failure.as_ref().and_then(|failure| failure.message.clone());
                warn!(deployment_id, state = %state, "Deployment ended without a job");
                JobOutcome::Terminal { state, message }
            }
        },
        Err(PollError::Exhausted {
            attempts,
            last_error,
        }) => {
            warn!(deployment_id, attempts, "Timed out waiting for deployment job");
            JobOutcome::TimedOut {
                attempts,
                last_error,
            }
        }
        Err(PollError::Cancelled { attempts }) => {
            info!(deployment_id, attempts, "Stopped waiting for deployment job");
            JobOutcome::Cancelled
        }
    }
}

fn reject_reserved_paths(overrides: &ParameterOverrides) -> std::result::Result<(), ParameterError> {
    match overrides
        .paths()
        .find(|path| path.is_within(&FLINK_CONFIGURATION_PATH))
    {
        Some(path) => Err(ParameterError::ReservedPath(path.to_string())),
        None => Ok(()),
    }
}

/// Defaults' spec with the desired state forced to `RUNNING`; callers change it with a `spec.state` override.
fn base_request(defaults: &DeploymentDefaults, query: &str) -> Map<String, Value> {
    let mut spec = defaults.spec();
    spec.insert(
        "state".to_string(),
        Value::String(DeploymentState::Running.to_string()),
    );

    match json!({
        "apiVersion": "v1",
        "kind": "Deployment",
        "metadata": { "name": deployment_name(query) },
        "spec": spec,
    }) {
        Value::Object(body) => body,
        _ => Map::new(),
    }
}

fn attach_query(body: &mut Map<String, Value>, query: &str) -> std::result::Result<(), ParameterError> {
    let artifact = descend_or_create(body, &ARTIFACT_PATH, &ARTIFACT_PATH.join("."))?;
    artifact.insert("kind".to_string(), Value::String("SQLSCRIPT".to_string()));
    artifact.insert("sqlScript".to_string(), Value::String(query.to_string()));
    Ok(())
}

/// Collapses whitespace in the query and truncates it to a usable display name.
pub fn deployment_name(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_NAME_CHARS) {
        Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
        None => collapsed,
    }
}
