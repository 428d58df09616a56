//! Aggregation tree and its discriminator-keyed deserializer.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::dsl::query::{BoolQuery, Query};
use crate::dsl::request::SortClause;
use crate::error::Error;

/// One named aggregation: a primary leaf plus optional nested containers.
#[derive(Debug, Clone)]
pub struct AggregationContainer {
    pub primary: LeafAggregation,
    pub sub_aggregations: BTreeMap<String, AggregationContainer>,
}

/// Closed set of supported aggregations.
#[derive(Debug, Clone)]
pub enum LeafAggregation {
    // metrics
    Avg(MetricAggregation),
    Cardinality(MetricAggregation),
    Max(MetricAggregation),
    Min(MetricAggregation),
    Percentiles(PercentilesAggregation),
    ExtendedStats(ExtendedStatsAggregation),
    TopHits(TopHitsAggregation),
    // buckets
    DateHistogram(DateHistogramAggregation),
    Histogram(HistogramAggregation),
    Terms(TermsAggregation),
    Range(RangeAggregation),
    DateRange(DateRangeAggregation),
    Filters(FiltersAggregation),
}

impl LeafAggregation {
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            Self::DateHistogram(_)
                | Self::Histogram(_)
                | Self::Terms(_)
                | Self::Range(_)
                | Self::DateRange(_)
                | Self::Filters(_)
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricAggregation {
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PercentilesAggregation {
    pub field: String,
    #[serde(default)]
    pub percents: Option<Vec<f64>>,
}

impl PercentilesAggregation {
    /// ES default percentile set.
    pub fn percents(&self) -> Vec<f64> {
        self.percents
            .clone()
            .unwrap_or_else(|| vec![1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedStatsAggregation {
    pub field: String,
    #[serde(default)]
    pub sigma: Option<f64>,
}

impl ExtendedStatsAggregation {
    pub fn sigma(&self) -> f64 {
        self.sigma.unwrap_or(2.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopHitsAggregation {
    #[serde(default)]
    pub docvalue_fields: Vec<DocValueField>,
    #[serde(default = "default_top_hits_size")]
    pub size: usize,
    #[serde(default)]
    pub sort: Vec<SortClause>,
}

fn default_top_hits_size() -> usize {
    1
}

impl TopHitsAggregation {
    /// The single doc-value field Kibana asks for.
    pub fn field(&self) -> Result<&str, Error> {
        self.docvalue_fields
            .first()
            .map(DocValueField::name)
            .ok_or_else(|| Error::Parse("top_hits needs a docvalue field".to_string()))
    }
}

/// Doc-value field spec: a bare string or `{field, format}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocValueField {
    Plain(String),
    Object {
        field: String,
        #[serde(default)]
        format: Option<String>,
    },
}

impl DocValueField {
    pub fn name(&self) -> &str {
        match self {
            Self::Plain(name) => name,
            Self::Object { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateHistogramAggregation {
    pub field: String,
    #[serde(default, alias = "fixed_interval", alias = "interval")]
    pub calendar_interval: Option<String>,
    #[serde(default)]
    pub min_doc_count: Option<u64>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl DateHistogramAggregation {
    pub fn interval(&self) -> &str {
        self.calendar_interval.as_deref().unwrap_or("1d")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistogramAggregation {
    pub field: String,
    pub interval: f64,
    #[serde(default)]
    pub min_doc_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermsAggregation {
    pub field: String,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub order: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeAggregation {
    pub field: String,
    pub ranges: Vec<RangeBucketSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeBucketSpec {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub from: Option<f64>,
    #[serde(default)]
    pub to: Option<f64>,
}

impl RangeBucketSpec {
    /// ES default label: `from-to` with `*` for an open end.
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{}-{}", fmt_bound(self.from), fmt_bound(self.to)),
        }
    }
}

fn fmt_bound(bound: Option<f64>) -> String {
    match bound {
        Some(v) => format!("{v:?}"),
        None => "*".to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeAggregation {
    pub field: String,
    pub ranges: Vec<DateRangeBucketSpec>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeBucketSpec {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl DateRangeBucketSpec {
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!(
                "{}-{}",
                self.from.as_deref().unwrap_or("*"),
                self.to.as_deref().unwrap_or("*")
            ),
        }
    }
}

/// Labelled filter buckets, in request order.
#[derive(Debug, Clone)]
pub struct FiltersAggregation {
    pub filters: Vec<(String, Query)>,
}

impl AggregationContainer {
    /// Parse one named aggregation object. The first recognized property
    /// becomes the primary leaf; `aggs`/`aggregations` hold children.
    /// A container with no recognized primary is dropped.
    pub fn from_value(value: &Value) -> Result<Option<AggregationContainer>, Error> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Parse(format!("aggregation must be an object: {value}")))?;

        let mut primary = None;
        let mut sub_aggregations = BTreeMap::new();
        for (key, body) in obj {
            match key.as_str() {
                "aggs" | "aggregations" => {
                    let children = body.as_object().ok_or_else(|| {
                        Error::Parse("nested aggregations must be an object".to_string())
                    })?;
                    for (name, child) in children {
                        if let Some(container) = AggregationContainer::from_value(child)? {
                            sub_aggregations.insert(name.clone(), container);
                        }
                    }
                }
                other => {
                    if primary.is_none() {
                        primary = LeafAggregation::from_key(other, body)?;
                    }
                }
            }
        }

        match primary {
            Some(primary) => Ok(Some(AggregationContainer {
                primary,
                sub_aggregations,
            })),
            None => {
                debug!("dropping aggregation with no recognized kind");
                Ok(None)
            }
        }
    }
}

impl LeafAggregation {
    fn from_key(key: &str, body: &Value) -> Result<Option<LeafAggregation>, Error> {
        let parse_err = |e: serde_json::Error| Error::Parse(format!("bad {key} body: {e}"));
        let leaf = match key {
            "avg" => Self::Avg(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "cardinality" => {
                Self::Cardinality(serde_json::from_value(body.clone()).map_err(parse_err)?)
            }
            "max" => Self::Max(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "min" => Self::Min(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "percentiles" => {
                Self::Percentiles(serde_json::from_value(body.clone()).map_err(parse_err)?)
            }
            "extended_stats" => {
                Self::ExtendedStats(serde_json::from_value(body.clone()).map_err(parse_err)?)
            }
            "top_hits" => Self::TopHits(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "date_histogram" => {
                Self::DateHistogram(serde_json::from_value(body.clone()).map_err(parse_err)?)
            }
            "histogram" => Self::Histogram(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "terms" => Self::Terms(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "range" => Self::Range(serde_json::from_value(body.clone()).map_err(parse_err)?),
            "date_range" => {
                Self::DateRange(serde_json::from_value(body.clone()).map_err(parse_err)?)
            }
            "filters" => Self::Filters(parse_filters(body)?),
            other => {
                debug!(aggregation = other, "dropping unrecognized aggregation kind");
                return Ok(None);
            }
        };
        Ok(Some(leaf))
    }
}

fn parse_filters(body: &Value) -> Result<FiltersAggregation, Error> {
    let labelled = body
        .get("filters")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Parse("filters body needs a filters map".to_string()))?;

    let mut filters = Vec::with_capacity(labelled.len());
    for (label, clause) in labelled {
        let query =
            Query::from_value(clause)?.unwrap_or_else(|| Query::Bool(BoolQuery::default()));
        filters.push((label.clone(), query));
    }
    Ok(FiltersAggregation { filters })
}
