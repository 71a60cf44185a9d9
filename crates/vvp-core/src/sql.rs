use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::session::{endpoints, VvpSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    ValidInsertQuery,
    ValidDdlStatement,
    ValidSelectQuery,
    ValidCommandStatement,
    Invalid,
    Unsupported,
    Other(String),
}

impl ValidationResult {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "VALIDATION_RESULT_VALID_INSERT_QUERY" => ValidationResult::ValidInsertQuery,
            "VALIDATION_RESULT_VALID_DDL_STATEMENT" => ValidationResult::ValidDdlStatement,
            "VALIDATION_RESULT_VALID_SELECT_QUERY" => ValidationResult::ValidSelectQuery,
            "VALIDATION_RESULT_VALID_COMMAND_STATEMENT" => ValidationResult::ValidCommandStatement,
            "VALIDATION_RESULT_INVALID" | "VALIDATION_RESULT_INVALID_QUERY" => ValidationResult::Invalid,
            "VALIDATION_RESULT_UNSUPPORTED_QUERY" => ValidationResult::Unsupported,
            other => ValidationResult::Other(other.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            ValidationResult::ValidInsertQuery
                | ValidationResult::ValidDdlStatement
                | ValidationResult::ValidSelectQuery
                | ValidationResult::ValidCommandStatement
        )
    }

    /// Only INSERT queries can back a deployment.
    pub fn is_deployable(&self) -> bool {
        matches!(self, ValidationResult::ValidInsertQuery)
    }
}

#[derive(Debug, Clone)]
pub struct SqlValidation {
    pub result: ValidationResult,
    pub raw_result: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResponse {
    #[serde(default)]
    validation_result: Option<String>,
    #[serde(default)]
    error_details: Option<ErrorDetails>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    #[serde(default)]
    message: Option<String>,
}

pub async fn validate_sql(session: &VvpSession, statement: &str) -> Result<SqlValidation> {
    let path = endpoints::sql_validate(session.namespace());
    let response: ValidationResponse = session
        .post_json(&path, &StatementRequest { statement })
        .await?;

    let raw_result = response
        .validation_result
        .unwrap_or_else(|| "VALIDATION_RESULT_UNKNOWN".to_string());
    let result = ValidationResult::parse(&raw_result);
    debug!(namespace = session.namespace(), result = %raw_result, "SQL validated");

    Ok(SqlValidation {
        result,
        raw_result,
        error_message: response.error_details.and_then(|details| details.message),
    })
}

/// Runs a statement through the SQL service and returns its raw result.
pub async fn execute_sql(session: &VvpSession, statement: &str) -> Result<Value> {
    let path = endpoints::sql_execute(session.namespace());
    session.post_json(&path, &StatementRequest { statement }).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_insert_queries_are_deployable() {
        assert!(ValidationResult::parse("VALIDATION_RESULT_VALID_INSERT_QUERY").is_deployable());
        let ddl = ValidationResult::parse("VALIDATION_RESULT_VALID_DDL_STATEMENT");
        assert!(ddl.is_valid());
        assert!(!ddl.is_deployable());
        assert_eq!(
            ValidationResult::parse("SOMETHING_NEW"),
            ValidationResult::Other("SOMETHING_NEW".to_string())
        );
    }
}
