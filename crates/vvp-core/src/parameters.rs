// crates/vvp-core/src/parameters.rs

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::merge::{split_assignment, ParameterError, ParameterOverrides};

/// Name of the variable consulted when no parameters are named explicitly.
pub const DEFAULT_PARAMETERS_VARIABLE: &str = "vvp_default_parameters";

const DEPLOYMENT_SCOPE: &str = "deployment";
const FLINK_SCOPE: &str = "flink";

/// User overrides for one deployment, split into request fields and Flink settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentParameters {
    pub deployment: ParameterOverrides,
    pub flink: BTreeMap<String, String>,
}

impl DeploymentParameters {
    /// Accepts either `{"deployment": {...}, "flink": {...}}` or a flat map of
    /// deployment-scoped paths.
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(ParameterError::Malformed(format!(
                    "expected an object of parameters, got {other}"
                )))
            }
        };

        let scoped = map
            .iter()
            .filter(|(key, value)| is_scope_key(key) && value.is_object())
            .count();

        if scoped == 0 {
            return Ok(Self {
                deployment: ParameterOverrides::from_map(map)?,
                flink: BTreeMap::new(),
            });
        }
        if scoped != map.len() {
            return Err(ParameterError::Malformed(
                "mixes 'deployment'/'flink' scopes with unscoped keys".to_string(),
            ));
        }

        let deployment = match map.get(DEPLOYMENT_SCOPE) {
            Some(Value::Object(inner)) => ParameterOverrides::from_map(inner)?,
            _ => ParameterOverrides::new(),
        };
        let flink = match map.get(FLINK_SCOPE) {
            Some(Value::Object(inner)) => flink_settings(inner)?,
            _ => BTreeMap::new(),
        };
        Ok(Self { deployment, flink })
    }

    pub fn is_empty(&self) -> bool {
        self.deployment.is_empty() && self.flink.is_empty()
    }

    /// Adds `key=value` deployment overrides on top of the current set.
    pub fn with_assignments<I, S>(mut self, assignments: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.deployment.extend(ParameterOverrides::from_assignments(assignments)?)?;
        Ok(self)
    }

    /// Adds `key=value` Flink settings; a key already present is a conflict.
    pub fn with_flink_assignments<I, S>(mut self, assignments: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for assignment in assignments {
            let (key, value) = split_assignment(assignment.as_ref())?;
            if self.flink.insert(key.to_string(), value.to_string()).is_some() {
                return Err(ParameterError::DuplicatePath(key.to_string()));
            }
        }
        Ok(self)
    }
}

fn is_scope_key(key: &str) -> bool {
    key == DEPLOYMENT_SCOPE || key == FLINK_SCOPE
}

fn flink_settings(map: &Map<String, Value>) -> Result<BTreeMap<String, String>, ParameterError> {
    map.iter()
        .map(|(key, value)| {
            let setting = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => {
                    return Err(ParameterError::Malformed(format!(
                        "flink setting '{key}' must be a scalar"
                    )))
                }
            };
            Ok((key.clone(), setting))
        })
        .collect()
}

/// Somewhere named parameter sets can be looked up.
pub trait ParameterSource {
    fn lookup(&self, name: &str) -> Result<Option<Value>, ParameterError>;
}

impl ParameterSource for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Result<Option<Value>, ParameterError> {
        Ok(self.get(name).cloned())
    }
}

/// Resolves variables from environment variables named after them (upper-cased).
///
/// A value is either inline JSON or `@path` to a `.json` or `.toml` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvParameterSource;

impl EnvParameterSource {
    pub fn variable_name(name: &str) -> String {
        name.to_ascii_uppercase()
    }
}

impl ParameterSource for EnvParameterSource {
    fn lookup(&self, name: &str) -> Result<Option<Value>, ParameterError> {
        let variable = Self::variable_name(name);
        let raw = match std::env::var(&variable) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        debug!(variable = %variable, "Loading parameters from environment");
        parse_parameter_text(&raw).map(Some)
    }
}

fn parse_parameter_text(raw: &str) -> Result<Value, ParameterError> {
    match raw.trim().strip_prefix('@') {
        Some(path) => load_parameter_file(Path::new(path)),
        None => serde_json::from_str(raw).map_err(|err| ParameterError::Malformed(err.to_string())),
    }
}

pub fn load_parameter_file(path: &Path) -> Result<Value, ParameterError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| ParameterError::Malformed(format!("{}: {err}", path.display())))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        let table: toml::Value = toml::from_str(&contents)
            .map_err(|err| ParameterError::Malformed(format!("{}: {err}", path.display())))?;
        serde_json::to_value(table).map_err(|err| ParameterError::Malformed(err.to_string()))
    } else {
        serde_json::from_str(&contents)
            .map_err(|err| ParameterError::Malformed(format!("{}: {err}", path.display())))
    }
}

/// Picks the parameter set for a deployment: the explicitly named variable, else the
/// default variable, else nothing.
pub fn resolve_parameters(
    source: &dyn ParameterSource,
    explicit_name: Option<&str>,
) -> Result<DeploymentParameters, ParameterError> {
    if let Some(name) = explicit_name {
        let value = source
            .lookup(name)?
            .ok_or_else(|| ParameterError::UnknownVariable(name.to_string()))?;
        return DeploymentParameters::from_value(&value);
    }

    match source.lookup(DEFAULT_PARAMETERS_VARIABLE)? {
        Some(value) => DeploymentParameters::from_value(&value),
        None => Ok(DeploymentParameters::default()),
    }
}
