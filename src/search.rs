//! End-to-end request execution: parse, translate, execute, map.

use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use crate::backend::QueryExecutor;
use crate::config::Settings;
use crate::dsl::request::SearchRequest;
use crate::error::Error;
use crate::kql::query_builder;
use crate::response::field_caps::{self, FieldCapsResponse};
use crate::response::mapper;
use crate::response::{Aggregate, SearchResponse};

/// Run one search request against an index. One translation, one
/// execution, one mapping pass; `took` covers all three.
pub async fn execute_search(
    executor: &dyn QueryExecutor,
    settings: &Settings,
    index: &str,
    body: &Value,
) -> Result<SearchResponse, Error> {
    let started = Instant::now();
    let index = settings.resolve_index(index)?;
    let request = SearchRequest::from_body(body)?;
    let translated = query_builder::build(settings, index, &request)?;
    let tables = executor.execute_query(&translated.kql).await?;

    let sort_fields: Vec<String> = request
        .sort
        .iter()
        .map(|clause| clause.field())
        .filter(|field| !field.is_empty() && !field.starts_with('_'))
        .collect();

    mapper::map_search(
        index,
        &tables,
        &translated.descriptor,
        &sort_fields,
        started.elapsed().as_millis() as u64,
    )
}

/// Like [`execute_search`] but always yields a response body: failures
/// become the ES error envelope.
pub async fn search(
    executor: &dyn QueryExecutor,
    settings: &Settings,
    index: &str,
    body: &Value,
) -> Value {
    match execute_search(executor, settings, index, body).await {
        Ok(response) => serde_json::to_value(response).unwrap_or(Value::Null),
        Err(error) => {
            warn!(%index, %error, "search failed");
            serde_json::to_value(error.to_response()).unwrap_or(Value::Null)
        }
    }
}

/// Discover an index's field capabilities via a schema control command.
pub async fn field_caps(
    executor: &dyn QueryExecutor,
    index: &str,
) -> Result<FieldCapsResponse, Error> {
    let command = format!(".show table ['{index}']");
    let tables = executor.execute_control_command(&command).await?;
    field_caps::map_field_caps(index, &tables)
}

/// List backing tables as index-pattern buckets.
pub async fn list_indices(executor: &dyn QueryExecutor) -> Result<Aggregate, Error> {
    let tables = executor
        .execute_control_command(".show tables | project TableName")
        .await?;
    Ok(field_caps::map_index_list(&tables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Column, DataTable};
    use crate::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeExecutor {
        tables: Vec<DataTable>,
        seen: Mutex<Vec<String>>,
        fail: Option<Error>,
    }

    impl FakeExecutor {
        fn returning(tables: Vec<DataTable>) -> Self {
            Self {
                tables,
                seen: Mutex::new(Vec::new()),
                fail: None,
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for FakeExecutor {
        async fn execute_query(&self, kql: &str) -> Result<Vec<DataTable>> {
            self.seen.lock().unwrap().push(kql.to_string());
            match &self.fail {
                Some(Error::Execution(msg)) => Err(Error::Execution(msg.clone())),
                _ => Ok(self.tables.clone()),
            }
        }

        async fn execute_control_command(&self, command: &str) -> Result<Vec<DataTable>> {
            self.seen.lock().unwrap().push(command.to_string());
            Ok(self.tables.clone())
        }
    }

    fn settings() -> Settings {
        Settings::new("telemetry")
    }

    #[tokio::test]
    async fn test_search_end_to_end() {
        let executor = FakeExecutor::returning(vec![DataTable {
            name: "hits".to_string(),
            columns: vec![Column::new("level", "System.String")],
            rows: vec![vec![json!("error")]],
        }]);
        let response = execute_search(
            &executor,
            &settings(),
            "logs",
            &json!({"query": {"match_phrase": {"level": "error"}}, "size": 1}),
        )
        .await
        .unwrap();

        assert_eq!(response.hits.total.value, 1);
        assert_eq!(response.hits.hits[0].source["level"], json!("error"));

        let seen = executor.seen.lock().unwrap();
        assert!(seen[0].contains("where (level == \"error\")"));
        assert!(seen[0].contains("database(\"telemetry\").['logs']"));
    }

    #[tokio::test]
    async fn test_parse_failure_becomes_error_envelope() {
        let executor = FakeExecutor::returning(vec![]);
        let body = search(
            &executor,
            &settings(),
            "logs",
            &json!({"query": {"query_string": {"query": "boosted^2"}}}),
        )
        .await;

        assert_eq!(body["responses"][0]["status"], 500);
        assert_eq!(
            body["responses"][0]["error"]["type"],
            "query_shard_exception"
        );
        // nothing was executed
        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execution_failure_keeps_reason() {
        let mut executor = FakeExecutor::returning(vec![]);
        executor.fail = Some(Error::Execution("backend unavailable".to_string()));
        let body = search(&executor, &settings(), "logs", &json!({})).await;
        assert_eq!(
            body["responses"][0]["error"]["type"],
            "search_phase_execution_exception"
        );
        assert!(body["responses"][0]["error"]["reason"]
            .as_str()
            .unwrap()
            .contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_field_caps_command() {
        let executor = FakeExecutor::returning(vec![DataTable {
            name: String::new(),
            columns: vec![
                Column::new("AttributeName", "System.String"),
                Column::new("AttributeType", "System.String"),
            ],
            rows: vec![vec![json!("bytes"), json!("System.Int64")]],
        }]);
        let response = field_caps(&executor, "logs").await.unwrap();
        assert!(response.fields.contains_key("bytes"));
        assert_eq!(
            executor.seen.lock().unwrap()[0],
            ".show table ['logs']"
        );
    }
}
