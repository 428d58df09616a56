//! Error types for the translation engine

use serde::Serialize;

/// Translation and execution errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("compile error: {0}")]
    Compile(String),

    #[error("invalid date math unit: {0}")]
    InvalidDateMathUnit(char),

    #[error("unknown field type: {0}")]
    Schema(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("missing required configuration value: {0}")]
    Validation(String),
}

impl Error {
    /// ES exception type name carried in the error envelope
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parsing_exception",
            Self::Compile(_) | Self::InvalidDateMathUnit(_) => "query_shard_exception",
            Self::Schema(_) => "mapper_parsing_exception",
            Self::Execution(_) => "search_phase_execution_exception",
            Self::Validation(_) => "action_request_validation_exception",
        }
    }

    /// Pipeline phase the failure belongs to
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Compile(_) | Self::InvalidDateMathUnit(_) => "compile",
            Self::Schema(_) => "schema",
            Self::Execution(_) => "execution",
            Self::Validation(_) => "validation",
        }
    }

    /// Wrap into the Elasticsearch error envelope. Status is fixed at 500.
    pub fn to_response(&self) -> ErrorResponse {
        let detail = ErrorDetail {
            root_cause: vec![RootCause {
                error_type: self.error_type().to_string(),
                reason: self.to_string(),
            }],
            error_type: self.error_type().to_string(),
            reason: self.to_string(),
            phase: self.phase().to_string(),
        };
        ErrorResponse {
            responses: vec![ErrorItem {
                error: detail,
                status: 500,
            }],
        }
    }
}

/// Elasticsearch-style error response envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub responses: Vec<ErrorItem>,
}

#[derive(Debug, Serialize)]
pub struct ErrorItem {
    pub error: ErrorDetail,
    pub status: u16,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub root_cause: Vec<RootCause>,
    #[serde(rename = "type")]
    pub error_type: String,
    pub reason: String,
    pub phase: String,
}

#[derive(Debug, Serialize)]
pub struct RootCause {
    #[serde(rename = "type")]
    pub error_type: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_keeps_type_name() {
        let err = Error::Schema("System.Whatever".to_string());
        assert!(err.to_string().contains("System.Whatever"));
        assert_eq!(err.error_type(), "mapper_parsing_exception");
    }

    #[test]
    fn test_envelope_status_is_500() {
        let err = Error::Execution("backend said no".to_string());
        let resp = err.to_response();
        assert_eq!(resp.responses.len(), 1);
        assert_eq!(resp.responses[0].status, 500);
        assert_eq!(resp.responses[0].error.phase, "execution");
        assert_eq!(resp.responses[0].error.root_cause.len(), 1);
    }

    #[test]
    fn test_envelope_serialization_shape() {
        let err = Error::Parse("bad clause".to_string());
        let json = serde_json::to_value(err.to_response()).unwrap();
        assert_eq!(json["responses"][0]["status"], 500);
        assert_eq!(json["responses"][0]["error"]["type"], "parsing_exception");
        assert!(json["responses"][0]["error"]["root_cause"].is_array());
    }

    #[test]
    fn test_date_math_unit_is_compile_phase() {
        let err = Error::InvalidDateMathUnit('q');
        assert_eq!(err.phase(), "compile");
        assert!(err.to_string().contains('q'));
    }
}
