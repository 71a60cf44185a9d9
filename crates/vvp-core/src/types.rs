// crates/vvp-core/src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state reported by the platform. Unknown states are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentState {
    Transitioning,
    Running,
    Failed,
    Cancelled,
    Suspended,
    Finished,
    Other(String),
}

impl DeploymentState {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentState::Transitioning => "TRANSITIONING",
            DeploymentState::Running => "RUNNING",
            DeploymentState::Failed => "FAILED",
            DeploymentState::Cancelled => "CANCELLED",
            DeploymentState::Suspended => "SUSPENDED",
            DeploymentState::Finished => "FINISHED",
            DeploymentState::Other(raw) => raw,
        }
    }

    /// States from which no job id will appear without further user action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Failed | DeploymentState::Cancelled | DeploymentState::Finished
        )
    }
}

impl From<String> for DeploymentState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "TRANSITIONING" => DeploymentState::Transitioning,
            "RUNNING" => DeploymentState::Running,
            "FAILED" => DeploymentState::Failed,
            "CANCELLED" => DeploymentState::Cancelled,
            "SUSPENDED" => DeploymentState::Suspended,
            "FINISHED" => DeploymentState::Finished,
            _ => DeploymentState::Other(raw),
        }
    }
}

impl From<DeploymentState> for String {
    fn from(state: DeploymentState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub annotations: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default)]
    pub state: Option<DeploymentState>,
    #[serde(default)]
    pub deployment_target_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningStatus {
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureStatus {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub state: Option<DeploymentState>,
    #[serde(default)]
    pub running: Option<RunningStatus>,
    #[serde(default)]
    pub failure: Option<FailureStatus>,
}

/// Deployment entity as returned by the platform; fields absent from a response stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: DeploymentMetadata,
    #[serde(default)]
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    pub fn id(&self) -> Option<&str> {
        self.metadata.id.as_deref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.status.running.as_ref().and_then(|running| running.job_id.as_deref())
    }

    pub fn state(&self) -> Option<&DeploymentState> {
        self.status.state.as_ref()
    }

    /// Human-readable notes the server attached to the deployment.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(failure) = &self.status.failure {
            if let Some(message) = &failure.message {
                warnings.push(message.clone());
            }
        }
        for (key, value) in self.metadata.annotations.iter().flatten() {
            if key.contains("warning") {
                match value {
                    Value::String(text) => warnings.push(format!("{key}: {text}")),
                    other => warnings.push(format!("{key}: {other}")),
                }
            }
        }
        warnings
    }
}

/// Namespace-level template spec; the raw JSON is kept so it can be merged into.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDefaults {
    raw: Map<String, Value>,
}

impl DeploymentDefaults {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(raw) => Some(Self { raw }),
            _ => None,
        }
    }

    pub fn deployment_target_id(&self) -> Option<&str> {
        self.raw
            .get("spec")
            .and_then(|spec| spec.get("deploymentTargetId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// The defaults' `spec` object, or an empty object if absent.
    pub fn spec(&self) -> Map<String, Value> {
        match self.raw.get("spec") {
            Some(Value::Object(spec)) => spec.clone(),
            _ => Map::new(),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }
}
