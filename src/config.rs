//! Engine configuration

use crate::error::Error;
use serde::Deserialize;

fn default_timeout_secs() -> u64 {
    60
}

/// Translation engine settings. The HTTP host hands these in; the engine
/// only validates and embeds them into compiled commands.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Target database name, interpolated into `database("...")`.
    pub database: String,

    /// Index (table) used when a request names none.
    #[serde(default)]
    pub default_index: Option<String>,

    /// Backend-side query timeout, embedded as `set servertimeout`.
    #[serde(default = "default_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Settings {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            default_index: None,
            query_timeout_secs: default_timeout_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.database.trim().is_empty() {
            return Err(Error::Validation("database".to_string()));
        }
        if self.query_timeout_secs == 0 {
            return Err(Error::Validation("query_timeout_secs".to_string()));
        }
        Ok(())
    }

    /// Pick the table to query: the request's index when given, the
    /// configured default otherwise.
    pub fn resolve_index<'a>(&'a self, index: &'a str) -> Result<&'a str, Error> {
        if !index.trim().is_empty() {
            return Ok(index);
        }
        self.default_index
            .as_deref()
            .ok_or_else(|| Error::Validation("index".to_string()))
    }

    /// Timeout rendered as a Kusto timespan literal (hh:mm:ss).
    pub fn server_timeout(&self) -> String {
        let secs = self.query_timeout_secs;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::new("telemetry");
        assert!(s.validate().is_ok());
        assert_eq!(s.server_timeout(), "00:01:00");
    }

    #[test]
    fn test_missing_database_fails_validation() {
        let s = Settings::new("");
        match s.validate() {
            Err(Error::Validation(field)) => assert_eq!(field, "database"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_formatting() {
        let mut s = Settings::new("db");
        s.query_timeout_secs = 3723;
        assert_eq!(s.server_timeout(), "01:02:03");
    }

    #[test]
    fn test_index_resolution() {
        let mut s = Settings::new("db");
        assert!(matches!(s.resolve_index(""), Err(Error::Validation(_))));
        s.default_index = Some("logs".to_string());
        assert_eq!(s.resolve_index("").unwrap(), "logs");
        assert_eq!(s.resolve_index("other").unwrap(), "other");
    }

    #[test]
    fn test_deserialize_from_json() {
        let s: Settings =
            serde_json::from_value(serde_json::json!({"database": "d", "query_timeout_secs": 30}))
                .unwrap();
        assert_eq!(s.query_timeout_secs, 30);
        assert!(s.default_index.is_none());
    }
}
