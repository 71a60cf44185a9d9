use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("invalid parameter path '{0}': segments must be non-empty")]
    InvalidPath(String),
    #[error("parameter path '{0}' supplied more than once")]
    DuplicatePath(String),
    #[error("parameter '{prefix}' is set as a value but '{path}' also addresses a field beneath it")]
    PrefixConflict { prefix: String, path: String },
    #[error("cannot set '{path}': '{leaf}' already holds a non-object value")]
    LeafConflict { path: String, leaf: String },
    #[error("parameter '{0}' is reserved for Flink configuration; pass it as a flink parameter instead")]
    ReservedPath(String),
    #[error("parameter variable '{0}' is not defined")]
    UnknownVariable(String),
    #[error("malformed parameters: {0}")]
    Malformed(String),
}

/// A dot-separated key addressing one nested field, e.g. `spec.template.spec.parallelism`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterPath {
    segments: Vec<String>,
}

impl ParameterPath {
    pub fn parse(raw: &str) -> Result<Self, ParameterError> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ParameterError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when `self` equals `ancestor` or lies anywhere beneath it.
    pub fn is_within(&self, ancestor: &[&str]) -> bool {
        self.segments.len() >= ancestor.len()
            && self
                .segments
                .iter()
                .zip(ancestor)
                .all(|(segment, expected)| segment == expected)
    }

    fn is_strict_prefix_of(&self, other: &ParameterPath) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for ParameterPath {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterPath::parse(s)
    }
}

/// Caller-supplied overrides keyed by unique [`ParameterPath`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterOverrides {
    entries: Vec<(ParameterPath, Value)>,
    seen: HashSet<ParameterPath>,
}

impl ParameterOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Result<(), ParameterError> {
        let path = ParameterPath::parse(key)?;
        if !self.seen.insert(path.clone()) {
            return Err(ParameterError::DuplicatePath(path.to_string()));
        }
        self.entries.push((path, value));
        Ok(())
    }

    /// Builds overrides from `key=value` assignments. Values that parse as JSON are
    /// kept typed, anything else is taken as a plain string.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::new();
        for assignment in assignments {
            let (key, value) = split_assignment(assignment.as_ref())?;
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            overrides.insert(key, value)?;
        }
        Ok(overrides)
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ParameterError> {
        let mut overrides = Self::new();
        for (key, value) in map {
            overrides.insert(key, value.clone())?;
        }
        Ok(overrides)
    }

    pub fn extend(&mut self, other: ParameterOverrides) -> Result<(), ParameterError> {
        for (path, value) in other.entries {
            if !self.seen.insert(path.clone()) {
                return Err(ParameterError::DuplicatePath(path.to_string()));
            }
            self.entries.push((path, value));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterPath, &Value)> {
        self.entries.iter().map(|(path, value)| (path, value))
    }

    pub fn paths(&self) -> impl Iterator<Item = &ParameterPath> {
        self.entries.iter().map(|(path, _)| path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn split_assignment(assignment: &str) -> Result<(&str, &str), ParameterError> {
    assignment
        .split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
        .ok_or_else(|| ParameterError::Malformed(format!("expected key=value, got '{assignment}'")))
}

/// Merges dotted-path overrides into `base`, creating intermediate objects as needed.
///
/// All conflicts are detected before `base` is touched, so on error `base` is unchanged.
pub fn merge(base: &mut Map<String, Value>, overrides: &ParameterOverrides) -> Result<(), ParameterError> {
    check_prefix_conflicts(overrides)?;
    for (path, _) in overrides.iter() {
        check_against_base(base, path)?;
    }

    for (path, value) in overrides.iter() {
        let (last, parents) = match path.segments().split_last() {
            Some(split) => split,
            None => continue,
        };
        let target = descend_or_create(base, parents, path)?;
        target.insert(last.clone(), value.clone());
    }

    Ok(())
}

/// Walks `parents` from `root`, inserting empty objects for missing levels.
pub(crate) fn descend_or_create<'a, S: AsRef<str>>(
    root: &'a mut Map<String, Value>,
    parents: &[S],
    path: &impl fmt::Display,
) -> Result<&'a mut Map<String, Value>, ParameterError> {
    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let entry = current
            .entry(segment.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(ParameterError::LeafConflict {
                    path: path.to_string(),
                    leaf: join_segments(&parents[..=depth]),
                })
            }
        };
    }
    Ok(current)
}

// Sorted segment-wise, a path's descendants directly follow it.
fn check_prefix_conflicts(overrides: &ParameterOverrides) -> Result<(), ParameterError> {
    let mut paths: Vec<&ParameterPath> = overrides.paths().collect();
    paths.sort();
    for pair in paths.windows(2) {
        if pair[0].is_strict_prefix_of(pair[1]) {
            return Err(ParameterError::PrefixConflict {
                prefix: pair[0].to_string(),
                path: pair[1].to_string(),
            });
        }
    }
    Ok(())
}

fn check_against_base(base: &Map<String, Value>, path: &ParameterPath) -> Result<(), ParameterError> {
    let parents = &path.segments()[..path.segments().len().saturating_sub(1)];
    let mut current = base;
    for (depth, segment) in parents.iter().enumerate() {
        match current.get(segment) {
            None => return Ok(()),
            Some(Value::Object(map)) => current = map,
            Some(_) => {
                return Err(ParameterError::LeafConflict {
                    path: path.to_string(),
                    leaf: join_segments(&parents[..=depth]),
                })
            }
        }
    }
    Ok(())
}

fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}
