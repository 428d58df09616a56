//! Maps backend result tables into the ES-shaped response.
//!
//! The executed command projects up to three named tables: `hits` (raw
//! rows), `aggs` (one row per bucket combination), and `metadata`
//! (bucket key string → caller label). The aggregation descriptor from
//! the builder says how to reassemble the flat `aggs` rows into the
//! nested bucket tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::backend::DataTable;
use crate::error::Error;
use crate::guid::guid_from_name;
use crate::kql::aggs_builder::{AggKind, AggNode, AggregationsDescriptor};
use crate::response::{
    Aggregate, Bucket, ExtendedStats, Hit, HitsCollection, SearchResponse, ShardStats,
    StdDeviationBounds, TopHit, TopHitsCollection, TotalHits,
};

const ISO_MS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn map_search(
    index: &str,
    tables: &[DataTable],
    descriptor: &AggregationsDescriptor,
    sort_fields: &[String],
    took: u64,
) -> Result<SearchResponse, Error> {
    let hits_table = tables.iter().find(|t| t.name == "hits");
    let aggs_table = tables.iter().find(|t| t.name == "aggs");
    let labels = tables
        .iter()
        .find(|t| t.name == "metadata")
        .map(label_map)
        .unwrap_or_default();

    let hits = match hits_table {
        Some(table) => map_hits(index, table, sort_fields)?,
        None => HitsCollection::default(),
    };
    let aggregations = match (descriptor.roots.is_empty(), aggs_table) {
        (true, _) | (false, None) => None,
        (false, Some(table)) => Some(map_aggregations(index, descriptor, table, &labels)?),
    };

    Ok(SearchResponse {
        took,
        timed_out: false,
        shards: ShardStats::default(),
        hits,
        aggregations,
        status: 200,
    })
}

fn label_map(table: &DataTable) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    for row in &table.rows {
        if let (Some(key), Some(value)) = (
            table.cell(row, "key").and_then(Value::as_str),
            table.cell(row, "value").and_then(Value::as_str),
        ) {
            labels.insert(key.to_string(), value.to_string());
        }
    }
    labels
}

/// Map raw rows into hit documents. `_id` is not a fixed placeholder:
/// it is derived from the index name and the serialized source, so
/// remapping the same rows yields the same identifiers.
fn map_hits(
    index: &str,
    table: &DataTable,
    sort_fields: &[String],
) -> Result<HitsCollection, Error> {
    let mut hits = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut source = Map::new();
        for (column, cell) in table.columns.iter().zip(row) {
            source.insert(column.name.clone(), convert_cell(&column.column_type, cell)?);
        }

        let sort = if sort_fields.is_empty() {
            None
        } else {
            let mut values = Vec::with_capacity(sort_fields.len());
            for field in sort_fields {
                let cell = table.cell(row, field).unwrap_or(&Value::Null);
                let is_datetime = table
                    .columns
                    .iter()
                    .find(|c| &c.name == field)
                    .map(|c| normalized_type(&c.column_type) == "DateTime")
                    .unwrap_or(false);
                // Kibana expects datetime sort values as epoch millis
                if is_datetime && !cell.is_null() {
                    values.push(json!(datetime_millis(cell)?));
                } else {
                    values.push(cell.clone());
                }
            }
            Some(values)
        };

        hits.push(Hit {
            index: index.to_string(),
            doc_type: "_doc".to_string(),
            id: guid_from_name(&format!("{index}:{}", Value::Object(source.clone()))).to_string(),
            version: 1,
            score: None,
            source,
            sort,
        });
    }

    Ok(HitsCollection {
        total: TotalHits::exactly(hits.len() as u64),
        max_score: None,
        hits,
    })
}

/// Convert one cell to the JSON kind its column type dictates.
fn convert_cell(column_type: &str, value: &Value) -> Result<Value, Error> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match normalized_type(column_type) {
        "DateTime" => Ok(Value::String(format_iso_millis(value)?)),
        "SByte" | "Boolean" => Ok(Value::Bool(truthy(value))),
        _ => Ok(value.clone()),
    }
}

fn normalized_type(column_type: &str) -> &str {
    if column_type.contains("SqlDecimal") {
        return "SqlDecimal";
    }
    column_type.strip_prefix("System.").unwrap_or(column_type)
}

fn truthy(value: &Value) -> bool {
    value
        .as_bool()
        .or_else(|| value.as_i64().map(|n| n != 0))
        .unwrap_or(false)
}

// Backend datetimes arrive as ISO strings (up to 100ns precision) or,
// after fromUnixTimeMilli round-trips, as epoch numbers.
fn datetime_millis(value: &Value) -> Result<i64, Error> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| Error::Execution(format!("bad datetime number: {n}"))),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| Error::Execution(format!("bad datetime value {s}: {e}"))),
        other => Err(Error::Execution(format!("bad datetime value: {other}"))),
    }
}

fn format_iso_millis(value: &Value) -> Result<String, Error> {
    let millis = datetime_millis(value)?;
    let datetime: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Execution(format!("datetime out of range: {millis}")))?;
    Ok(datetime.format(ISO_MS).to_string())
}

fn map_aggregations(
    index: &str,
    descriptor: &AggregationsDescriptor,
    table: &DataTable,
    labels: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Aggregate>, Error> {
    let rows: Vec<&Vec<Value>> = table.rows.iter().collect();
    let mut aggregations = BTreeMap::new();
    for (name, node) in &descriptor.roots {
        let aggregate = if node.kind.is_bucket() {
            map_bucket_aggregation(index, name, node, table, &rows, labels)?
        } else {
            map_metric(index, name, node, table, rows.first().copied())?
        };
        aggregations.insert(name.clone(), aggregate);
    }
    Ok(aggregations)
}

fn map_bucket_aggregation(
    index: &str,
    name: &str,
    node: &AggNode,
    table: &DataTable,
    rows: &[&Vec<Value>],
    labels: &BTreeMap<String, String>,
) -> Result<Aggregate, Error> {
    if let AggKind::Filters {
        labels: filter_labels,
    } = &node.kind
    {
        return map_filters(name, filter_labels, table, rows);
    }

    // group rows by the key column, preserving first-seen order
    let mut groups: Vec<(Value, Vec<&Vec<Value>>)> = Vec::new();
    for row in rows.iter().copied() {
        let key = table.cell(row, name).cloned().unwrap_or(Value::Null);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    let count_col = format!("{name}%count");
    let mut buckets = Vec::with_capacity(groups.len());
    for (key, group) in groups {
        let first = group[0];
        let mut bucket = Bucket {
            doc_count: cell_u64(table.cell(first, &count_col)),
            ..Bucket::default()
        };

        match &node.kind {
            AggKind::DateHistogram => {
                bucket.key = Some(json!(datetime_millis(&key)?));
                bucket.key_as_string = Some(format_iso_millis(&key)?);
            }
            AggKind::Histogram => bucket.key = Some(key),
            AggKind::Terms => bucket.key = Some(key),
            AggKind::Range { entries } => {
                let raw = key.as_str().unwrap_or_default();
                let label = match labels.get(raw) {
                    Some(label) => label.clone(),
                    // the catch-all bucket has no label and is dropped
                    None => continue,
                };
                if let Some(entry) = entries.iter().find(|e| e.label == label) {
                    bucket.from = entry.from.map(|v| json!(v));
                    bucket.to = entry.to.map(|v| json!(v));
                }
                bucket.key = Some(json!(label));
            }
            AggKind::DateRange { entries } => {
                let raw = key.as_str().unwrap_or_default();
                let label = match labels.get(raw) {
                    Some(label) => label.clone(),
                    None => continue,
                };
                if let Some(entry) = entries.iter().find(|e| e.label == label) {
                    bucket.from = entry.from.clone().map(Value::String);
                    bucket.to = entry.to.clone().map(Value::String);
                }
                bucket.key = Some(json!(label));
            }
            other => {
                return Err(Error::Execution(format!(
                    "not a bucket aggregation: {other:?}"
                )))
            }
        }

        for (child_name, child) in &node.children {
            let aggregate = if child.kind.is_bucket() {
                map_bucket_aggregation(index, child_name, child, table, &group, labels)?
            } else {
                map_metric(index, child_name, child, table, Some(first))?
            };
            bucket.aggregations.insert(child_name.clone(), aggregate);
        }
        buckets.push(bucket);
    }

    Ok(Aggregate::Buckets { buckets })
}

// Filters buckets are keyed by label. Each filter's doc_count sums the
// per-combination counts of the rows where its flag column is set.
// Filters carry no sub-aggregations; the builder rejects them.
fn map_filters(
    name: &str,
    filter_labels: &[String],
    table: &DataTable,
    rows: &[&Vec<Value>],
) -> Result<Aggregate, Error> {
    let count_col = format!("{name}%count");
    let mut buckets = BTreeMap::new();
    for (i, label) in filter_labels.iter().enumerate() {
        let flag_col = format!("{name}%{i}");
        let bucket = Bucket {
            doc_count: rows
                .iter()
                .filter(|row| table.cell(row, &flag_col).map(truthy).unwrap_or(false))
                .map(|row| cell_u64(table.cell(row, &count_col)))
                .sum(),
            ..Bucket::default()
        };
        buckets.insert(label.clone(), bucket);
    }
    Ok(Aggregate::KeyedBuckets { buckets })
}

fn map_metric(
    index: &str,
    name: &str,
    node: &AggNode,
    table: &DataTable,
    row: Option<&Vec<Value>>,
) -> Result<Aggregate, Error> {
    let cell = |suffix: &str| row.and_then(|r| table.cell(r, &format!("{name}%{suffix}")));
    let stat = |suffix: &str| cell(suffix).and_then(Value::as_f64);

    match &node.kind {
        AggKind::Value => Ok(Aggregate::Value {
            value: stat("value"),
        }),
        AggKind::Percentiles { percents } => {
            let array = cell("percentiles")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut values = BTreeMap::new();
            for (percent, value) in percents.iter().zip(array) {
                values.insert(format!("{percent:?}"), value);
            }
            Ok(Aggregate::Percentiles { values })
        }
        AggKind::ExtendedStats { sigma } => {
            let avg = stat("avg");
            let std_population = stat("std_deviation_population");
            let std_sampling = stat("std_deviation");
            let bound = |std: Option<f64>, factor: f64| {
                avg.zip(std).map(|(a, s)| a + factor * s * sigma)
            };
            Ok(Aggregate::ExtendedStats(ExtendedStats {
                count: cell_u64(cell("count")),
                min: stat("min"),
                max: stat("max"),
                avg,
                sum: stat("sum"),
                sum_of_squares: stat("sum_of_squares"),
                variance: stat("variance_population"),
                variance_population: stat("variance_population"),
                variance_sampling: stat("variance"),
                std_deviation: std_population,
                std_deviation_population: std_population,
                std_deviation_sampling: std_sampling,
                std_deviation_bounds: StdDeviationBounds {
                    upper: bound(std_population, 1.0),
                    lower: bound(std_population, -1.0),
                    upper_population: bound(std_population, 1.0),
                    lower_population: bound(std_population, -1.0),
                    upper_sampling: bound(std_sampling, 1.0),
                    lower_sampling: bound(std_sampling, -1.0),
                },
            }))
        }
        AggKind::TopHits { field } => {
            let entries = cell("hits")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let hits: Vec<TopHit> = entries
                .iter()
                .map(|entry| {
                    let mut fields = Map::new();
                    fields.insert(
                        field.clone(),
                        Value::Array(vec![entry.get("field").cloned().unwrap_or(Value::Null)]),
                    );
                    TopHit {
                        index: index.to_string(),
                        doc_type: "_doc".to_string(),
                        id: guid_from_name(&format!("{index}:{entry}")).to_string(),
                        score: None,
                        fields,
                        sort: vec![entry.get("sort").cloned().unwrap_or(Value::Null)],
                    }
                })
                .collect();
            Ok(Aggregate::TopHits {
                hits: TopHitsCollection {
                    total: TotalHits::exactly(hits.len() as u64),
                    max_score: None,
                    hits,
                },
            })
        }
        other => Err(Error::Execution(format!(
            "not a metric aggregation: {other:?}"
        ))),
    }
}

fn cell_u64(value: Option<&Value>) -> u64 {
    value
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or(0)
}
