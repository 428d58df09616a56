//! Elasticsearch-shaped response model.
//!
//! Serialization-only types; the mapper in this module's submodules
//! fills them from backend result tables.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

pub mod field_caps;
pub mod mapper;

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub took: u64,
    pub timed_out: bool,
    #[serde(rename = "_shards")]
    pub shards: ShardStats,
    pub hits: HitsCollection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<BTreeMap<String, Aggregate>>,
    pub status: u16,
}

/// There are no shards here; Kibana still expects the block.
#[derive(Debug, Serialize)]
pub struct ShardStats {
    pub total: u32,
    pub successful: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl Default for ShardStats {
    fn default() -> Self {
        Self {
            total: 1,
            successful: 1,
            skipped: 0,
            failed: 0,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct HitsCollection {
    pub total: TotalHits,
    pub max_score: Option<f64>,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Serialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: String,
}

impl Default for TotalHits {
    fn default() -> Self {
        Self {
            value: 0,
            relation: "eq".to_string(),
        }
    }
}

impl TotalHits {
    pub fn exactly(value: u64) -> Self {
        Self {
            value,
            relation: "eq".to_string(),
        }
    }
}

/// One search hit. `_source` preserves column order.
#[derive(Debug, Serialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: u64,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    #[serde(rename = "_source")]
    pub source: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,
}

/// One reassembled aggregation result.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Aggregate {
    Buckets { buckets: Vec<Bucket> },
    /// `filters` aggregations key their buckets by label.
    KeyedBuckets { buckets: BTreeMap<String, Bucket> },
    Percentiles { values: BTreeMap<String, Value> },
    ExtendedStats(ExtendedStats),
    TopHits { hits: TopHitsCollection },
    Value { value: Option<f64> },
}

#[derive(Debug, Default, Serialize)]
pub struct Bucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    pub doc_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
    #[serde(flatten)]
    pub aggregations: BTreeMap<String, Aggregate>,
}

#[derive(Debug, Default, Serialize)]
pub struct ExtendedStats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: Option<f64>,
    pub sum_of_squares: Option<f64>,
    pub variance: Option<f64>,
    pub variance_population: Option<f64>,
    pub variance_sampling: Option<f64>,
    pub std_deviation: Option<f64>,
    pub std_deviation_population: Option<f64>,
    pub std_deviation_sampling: Option<f64>,
    pub std_deviation_bounds: StdDeviationBounds,
}

#[derive(Debug, Default, Serialize)]
pub struct StdDeviationBounds {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub upper_population: Option<f64>,
    pub lower_population: Option<f64>,
    pub upper_sampling: Option<f64>,
    pub lower_sampling: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct TopHitsCollection {
    pub total: TotalHits,
    pub max_score: Option<f64>,
    pub hits: Vec<TopHit>,
}

#[derive(Debug, Serialize)]
pub struct TopHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    pub fields: Map<String, Value>,
    pub sort: Vec<Value>,
}
