//! The top-level search request body.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::dsl::aggs::AggregationContainer;
use crate::dsl::query::Query;
use crate::error::Error;

/// An ES `_search` (or msearch line) body. `query` and `aggs` stay raw
/// here; the discriminator dispatch happens in `query_tree` /
/// `aggregation_tree`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub sort: Vec<SortClause>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, alias = "aggregations")]
    pub aggs: Option<Value>,
    #[serde(default)]
    pub highlight: Option<Value>,
    #[serde(default)]
    pub docvalue_fields: Option<Value>,
}

impl SearchRequest {
    pub fn from_body(body: &Value) -> Result<SearchRequest, Error> {
        serde_json::from_value(body.clone())
            .map_err(|e| Error::Parse(format!("bad search request: {e}")))
    }

    pub fn query_tree(&self) -> Result<Option<Query>, Error> {
        match &self.query {
            Some(raw) => Query::from_value(raw),
            None => Ok(None),
        }
    }

    pub fn aggregation_tree(&self) -> Result<BTreeMap<String, AggregationContainer>, Error> {
        let mut tree = BTreeMap::new();
        if let Some(raw) = &self.aggs {
            let obj = raw
                .as_object()
                .ok_or_else(|| Error::Parse("aggs must be an object".to_string()))?;
            for (name, body) in obj {
                if let Some(container) = AggregationContainer::from_value(body)? {
                    tree.insert(name.clone(), container);
                }
            }
        }
        Ok(tree)
    }

    pub fn size(&self) -> u64 {
        self.size.unwrap_or(10)
    }
}

/// One sort entry: a bare field name or `{field: {order: ...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SortClause {
    Field(String),
    Spec(BTreeMap<String, SortOrder>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SortOrder {
    Simple(String),
    Spec {
        order: String,
        #[serde(default)]
        unmapped_type: Option<String>,
    },
}

impl SortOrder {
    pub fn direction(&self) -> &str {
        match self {
            Self::Simple(order) => order,
            Self::Spec { order, .. } => order,
        }
    }
}

impl SortClause {
    /// `(field, direction)`; direction defaults to ascending.
    pub fn field_and_order(&self) -> (String, String) {
        match self {
            Self::Field(field) => (field.clone(), "asc".to_string()),
            Self::Spec(spec) => spec
                .iter()
                .next()
                .map(|(field, order)| (field.clone(), order.direction().to_string()))
                .unwrap_or_default(),
        }
    }

    pub fn field(&self) -> String {
        self.field_and_order().0
    }
}
