//! Staged KQL aggregation pipeline.
//!
//! A bucket aggregation becomes a chain of `let` statements: `_extdata`
//! extends the bucket key onto every row, `_summarizablemetrics` computes
//! every associative metric in one summarize pass, row-level metrics
//! (`top_hits`) partition and join back, and nested buckets recurse with
//! their own summarize + join. Range-style buckets additionally emit a
//! literal datatable mapping bucket key strings back to caller labels.

use std::collections::BTreeMap;

use crate::datemath;
use crate::dsl::aggs::{
    AggregationContainer, DateRangeBucketSpec, LeafAggregation, RangeBucketSpec,
    TopHitsAggregation,
};
use crate::dsl::query::Query;
use crate::error::Error;
use crate::kql::compile::{self, Fragment};

/// What the builder hands back to the query builder and, via the
/// descriptor, to the result mapper.
#[derive(Debug)]
pub struct AggregationPipeline {
    /// `let ...;` statements, in dependency order.
    pub statements: Vec<String>,
    /// Tabular expression for the `| as aggs` projection.
    pub final_expr: String,
    /// Bucket key string → caller label, for the metadata side-table.
    pub metadata: Vec<(String, String)>,
    pub descriptor: AggregationsDescriptor,
}

/// Shape information the result mapper needs to reassemble rows into
/// ES aggregation objects.
#[derive(Debug, Clone, Default)]
pub struct AggregationsDescriptor {
    pub roots: BTreeMap<String, AggNode>,
}

#[derive(Debug, Clone)]
pub struct AggNode {
    pub kind: AggKind,
    pub children: BTreeMap<String, AggNode>,
}

#[derive(Debug, Clone)]
pub enum AggKind {
    Value,
    Percentiles { percents: Vec<f64> },
    ExtendedStats { sigma: f64 },
    TopHits { field: String },
    DateHistogram,
    Histogram,
    Terms,
    Range { entries: Vec<RangeEntry> },
    DateRange { entries: Vec<DateRangeEntry> },
    Filters { labels: Vec<String> },
}

impl AggKind {
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            Self::DateHistogram
                | Self::Histogram
                | Self::Terms
                | Self::Range { .. }
                | Self::DateRange { .. }
                | Self::Filters { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct RangeEntry {
    pub label: String,
    pub from: Option<f64>,
    pub to: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DateRangeEntry {
    pub label: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Build the aggregation pipeline for a parsed aggregation tree.
pub fn build(
    aggs: &BTreeMap<String, AggregationContainer>,
) -> Result<AggregationPipeline, Error> {
    let mut descriptor = AggregationsDescriptor::default();
    for (name, container) in aggs {
        descriptor
            .roots
            .insert(name.clone(), descriptor_node(container));
    }

    let buckets: Vec<_> = aggs
        .iter()
        .filter(|(_, c)| c.primary.is_bucket())
        .collect();
    let metrics: Vec<_> = aggs
        .iter()
        .filter(|(_, c)| !c.primary.is_bucket())
        .collect();

    if buckets.len() > 1 {
        return Err(Error::Compile(
            "multiple root bucket aggregations are not supported".to_string(),
        ));
    }
    if !buckets.is_empty() && !metrics.is_empty() {
        return Err(Error::Compile(
            "root metrics cannot be combined with a bucket aggregation".to_string(),
        ));
    }

    if let Some((name, container)) = buckets.into_iter().next() {
        let mut builder = Builder::default();
        let (table, _) = builder.build_level(name, container, &[], &[])?;
        let final_expr = if builder.order_parts.is_empty() {
            table
        } else {
            format!("{table}\n| order by {}", builder.order_parts.join(", "))
        };
        return Ok(AggregationPipeline {
            statements: builder.statements,
            final_expr,
            metadata: builder.metadata,
            descriptor,
        });
    }

    // Metric-only roots: a single global summarize.
    let mut columns = Vec::new();
    for (name, container) in metrics {
        if matches!(container.primary, LeafAggregation::TopHits(_)) {
            return Err(Error::Compile(
                "top_hits requires a bucket aggregation".to_string(),
            ));
        }
        let (exprs, _) = metric_exprs(name, &container.primary)?;
        columns.extend(exprs);
    }
    let statements = vec![format!(
        "let _summarizablemetrics = _data\n| summarize {};",
        columns.join(", ")
    )];
    Ok(AggregationPipeline {
        statements,
        final_expr: "_summarizablemetrics".to_string(),
        metadata: Vec::new(),
        descriptor,
    })
}

#[derive(Default)]
struct Builder {
    statements: Vec<String>,
    metadata: Vec<(String, String)>,
    order_parts: Vec<String>,
    table_seq: usize,
}

struct BucketKey {
    extend: String,
    group_cols: Vec<String>,
    order: Option<String>,
}

impl Builder {
    fn fresh(&mut self, prefix: &str) -> String {
        self.table_seq += 1;
        format!("{prefix}{}", self.table_seq)
    }

    /// One bucket level: summarize metrics by the key path, attach
    /// top_hits via partition/join, recurse into the nested bucket.
    /// Returns the level's table name and its full key column path.
    fn build_level(
        &mut self,
        name: &str,
        container: &AggregationContainer,
        parent_cols: &[String],
        pending_extends: &[String],
    ) -> Result<(String, Vec<String>), Error> {
        // A filter's rows span flag combinations, so per-filter metrics
        // cannot be recovered from the combination-grouped summarize.
        // Fail loudly instead of emitting buckets with missing metrics.
        if matches!(container.primary, LeafAggregation::Filters(_))
            && !container.sub_aggregations.is_empty()
        {
            return Err(Error::Compile(
                "sub-aggregations under a filters aggregation are not supported".to_string(),
            ));
        }
        let key = self.bucket_key(name, &container.primary)?;
        let is_root = parent_cols.is_empty();

        // The root key lives in _extdata; nested keys extend inline.
        let mut extends = pending_extends.to_vec();
        if is_root {
            self.statements
                .push(format!("let _extdata = _data\n| extend {};", key.extend));
        } else {
            extends.push(key.extend.clone());
        }
        if let Some(order) = &key.order {
            self.order_parts.push(order.clone());
        }

        let mut group_cols = parent_cols.to_vec();
        group_cols.extend(key.group_cols.iter().cloned());

        let mut metric_columns = Vec::new();
        // Columns that must survive later re-grouping stages. Threaded
        // explicitly so each stage's take_any list is exact.
        let mut accumulator: Vec<String> = Vec::new();
        let mut top_hits_children: Vec<(&String, &TopHitsAggregation)> = Vec::new();
        let mut bucket_children: Vec<(&String, &AggregationContainer)> = Vec::new();

        for (child_name, child) in &container.sub_aggregations {
            match &child.primary {
                LeafAggregation::TopHits(top_hits) => {
                    top_hits_children.push((child_name, top_hits))
                }
                primary if primary.is_bucket() => bucket_children.push((child_name, child)),
                primary => {
                    let (exprs, cols) = metric_exprs(child_name, primary)?;
                    metric_columns.extend(exprs);
                    accumulator.extend(cols);
                }
            }
        }

        let count_col = format!("['{name}%count']");
        metric_columns.push(format!("{count_col} = count()"));
        accumulator.push(count_col.clone());

        let table = if is_root {
            "_summarizablemetrics".to_string()
        } else {
            self.fresh("_nested")
        };
        let mut stmt = format!("let {table} = _extdata");
        for extend in &extends {
            stmt.push_str("\n| extend ");
            stmt.push_str(extend);
        }
        stmt.push_str(&format!(
            "\n| summarize {} by {}",
            metric_columns.join(", "),
            group_cols.join(", ")
        ));
        if let LeafAggregation::Terms(terms) = &container.primary {
            let size = terms.size.unwrap_or(10);
            let (order_col, direction) = terms_order(name, terms, &count_col);
            stmt.push_str(&format!("\n| top {size} by {order_col} {direction}"));
        }
        stmt.push(';');
        self.statements.push(stmt);

        let mut current = table;
        for (child_name, top_hits) in top_hits_children {
            if group_cols.len() != 1 {
                return Err(Error::Compile(
                    "top_hits is only supported directly under a single-key bucket".to_string(),
                ));
            }
            current =
                self.top_hits_stage(&group_cols[0], child_name, top_hits, &mut accumulator, &current)?;
        }

        if bucket_children.len() > 1 {
            return Err(Error::Compile(
                "only one nested bucket aggregation per level is supported".to_string(),
            ));
        }
        let mut full_cols = group_cols.clone();
        for (child_name, child) in bucket_children {
            let (child_table, child_cols) =
                self.build_level(child_name, child, &group_cols, &extends)?;
            current = self.join_back(&child_table, &current, &group_cols);
            full_cols = child_cols;
        }

        Ok((current, full_cols))
    }

    // partition the raw rows by the bucket key, keep the top k per
    // bucket, pack them into a list column, then join the list back and
    // re-group with take_any over everything accumulated so far.
    fn top_hits_stage(
        &mut self,
        key_col: &str,
        child_name: &str,
        top_hits: &TopHitsAggregation,
        accumulator: &mut Vec<String>,
        current: &str,
    ) -> Result<String, Error> {
        let hits_col = format!("['{child_name}%hits']");
        let field = top_hits.field()?;
        let (sort_field, direction) = top_hits
            .sort
            .first()
            .map(|s| s.field_and_order())
            .unwrap_or_else(|| (field.to_string(), "desc".to_string()));

        let partitioned = self.fresh("_tophits");
        self.statements.push(format!(
            "let {partitioned} = _extdata\n\
             | partition by {key_col} (\n\
             \x20   top {size} by ['{sort_field}'] {direction}\n\
             \x20   | project ['_partkey'] = {key_col}, {hits_col} = pack(\"field\", ['{field}'], \"sort\", ['{sort_field}'])\n\
             )\n\
             | summarize {hits_col} = make_list({hits_col}) by ['_partkey'];",
            size = top_hits.size,
        ));

        let take_list: Vec<String> = accumulator
            .iter()
            .map(|col| format!("{col} = take_any({col})"))
            .collect();
        let joined = self.fresh("_joined");
        self.statements.push(format!(
            "let {joined} = {current}\n\
             | join kind=inner ({partitioned}) on $left.{key_col} == $right.['_partkey']\n\
             | project-away ['_partkey']\n\
             | summarize {takes}, {hits_col} = take_any({hits_col}) by {key_col};",
            takes = take_list.join(", "),
        ));
        accumulator.push(hits_col);
        Ok(joined)
    }

    // Join a child level back onto its parent on the parent key path.
    // The right side's key columns are renamed first so the join never
    // produces duplicate names.
    fn join_back(&mut self, child: &str, parent: &str, keys: &[String]) -> String {
        let renames: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("['_jk{i}'] = {k}"))
            .collect();
        let conditions: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("$left.{k} == $right.['_jk{i}']"))
            .collect();
        let drops: Vec<String> = (0..keys.len()).map(|i| format!("['_jk{i}']")).collect();

        let joined = self.fresh("_joined");
        self.statements.push(format!(
            "let {joined} = {child}\n\
             | join kind=inner ({parent} | project-rename {}) on {}\n\
             | project-away {};",
            renames.join(", "),
            conditions.join(", "),
            drops.join(", ")
        ));
        joined
    }

    fn bucket_key(&mut self, name: &str, leaf: &LeafAggregation) -> Result<BucketKey, Error> {
        let col = format!("['{name}']");
        match leaf {
            LeafAggregation::DateHistogram(d) => Ok(BucketKey {
                extend: format!("{col} = {}", date_key_expr(&d.field, d.interval())),
                group_cols: vec![col.clone()],
                order: Some(format!("{col} asc")),
            }),
            LeafAggregation::Histogram(h) => Ok(BucketKey {
                extend: format!("{col} = bin(['{}'], {:?})", h.field, h.interval),
                group_cols: vec![col.clone()],
                order: Some(format!("{col} asc")),
            }),
            LeafAggregation::Terms(t) => Ok(BucketKey {
                extend: format!("{col} = ['{}']", t.field),
                group_cols: vec![col],
                order: None,
            }),
            LeafAggregation::Range(r) => {
                let mut arms = Vec::new();
                for (i, spec) in r.ranges.iter().enumerate() {
                    let mut conds = Vec::new();
                    if let Some(from) = spec.from {
                        conds.push(format!("['{}'] >= {from:?}", r.field));
                    }
                    if let Some(to) = spec.to {
                        conds.push(format!("['{}'] < {to:?}", r.field));
                    }
                    let cond = if conds.is_empty() {
                        "true".to_string()
                    } else {
                        conds.join(" and ")
                    };
                    let bucket_key = format!("{name}%{i}");
                    self.metadata.push((bucket_key.clone(), spec.label()));
                    arms.push(format!("{cond}, \"{bucket_key}\""));
                }
                Ok(BucketKey {
                    extend: format!("{col} = case({}, \"{name}%-1\")", arms.join(", ")),
                    group_cols: vec![col.clone()],
                    order: Some(format!("{col} asc")),
                })
            }
            LeafAggregation::DateRange(r) => {
                let mut arms = Vec::new();
                for (i, spec) in r.ranges.iter().enumerate() {
                    let mut conds = Vec::new();
                    if let Some(from) = &spec.from {
                        conds.push(format!("['{}'] >= {}", r.field, datemath::to_kusto_expr(from)?));
                    }
                    if let Some(to) = &spec.to {
                        conds.push(format!("['{}'] < {}", r.field, datemath::to_kusto_expr(to)?));
                    }
                    let cond = if conds.is_empty() {
                        "true".to_string()
                    } else {
                        conds.join(" and ")
                    };
                    let bucket_key = format!("{name}%{i}");
                    self.metadata.push((bucket_key.clone(), spec.label()));
                    arms.push(format!("{cond}, \"{bucket_key}\""));
                }
                Ok(BucketKey {
                    extend: format!("{col} = case({}, \"{name}%-1\")", arms.join(", ")),
                    group_cols: vec![col.clone()],
                    order: Some(format!("{col} asc")),
                })
            }
            LeafAggregation::Filters(f) => {
                let mut extends = Vec::new();
                let mut group_cols = Vec::new();
                for (i, (label, query)) in f.filters.iter().enumerate() {
                    let flag_col = format!("['{name}%{i}']");
                    extends.push(format!("{flag_col} = ({})", filter_predicate(query)?));
                    self.metadata.push((format!("{name}%{i}"), label.clone()));
                    group_cols.push(flag_col);
                }
                Ok(BucketKey {
                    extend: extends.join(", "),
                    group_cols,
                    order: None,
                })
            }
            other => Err(Error::Compile(format!(
                "not a bucket aggregation: {other:?}"
            ))),
        }
    }
}

fn filter_predicate(query: &Query) -> Result<String, Error> {
    match compile::compile(query)? {
        Fragment::Predicate(p) => Ok(p),
        Fragment::Empty => Ok("true".to_string()),
        Fragment::Stage(_) => Err(Error::Compile(
            "free text search is not allowed inside a filters aggregation".to_string(),
        )),
    }
}

fn terms_order(
    name: &str,
    terms: &crate::dsl::aggs::TermsAggregation,
    count_col: &str,
) -> (String, String) {
    let default = || (count_col.to_string(), "desc".to_string());
    match &terms.order {
        Some(order) => order
            .iter()
            .next()
            .map(|(target, direction)| {
                let column = match target.as_str() {
                    "_count" => count_col.to_string(),
                    "_key" | "_term" => format!("['{name}']"),
                    metric => format!("['{metric}%value']"),
                };
                (column, direction.clone())
            })
            .unwrap_or_else(default),
        None => default(),
    }
}

fn date_key_expr(field: &str, interval: &str) -> String {
    match interval {
        "y" | "1y" | "year" => format!("startofyear(['{field}'])"),
        "M" | "1M" | "month" => format!("startofmonth(['{field}'])"),
        "w" | "1w" | "week" => format!("startofweek(['{field}'])"),
        "d" | "1d" | "day" => format!("startofday(['{field}'])"),
        other => format!("bin(['{field}'], {other})"),
    }
}

// One summarize pass covers every associative metric. Returns the
// column assignments and the resulting column names.
fn metric_exprs(
    name: &str,
    leaf: &LeafAggregation,
) -> Result<(Vec<String>, Vec<String>), Error> {
    let value_col = |func: &str, field: &str| {
        let col = format!("['{name}%value']");
        (vec![format!("{col} = {func}(['{field}'])")], vec![col])
    };
    match leaf {
        LeafAggregation::Avg(m) => Ok(value_col("avg", &m.field)),
        LeafAggregation::Cardinality(m) => Ok(value_col("dcount", &m.field)),
        LeafAggregation::Min(m) => Ok(value_col("min", &m.field)),
        LeafAggregation::Max(m) => Ok(value_col("max", &m.field)),
        LeafAggregation::Percentiles(p) => {
            let col = format!("['{name}%percentiles']");
            let percents: Vec<String> = p.percents().iter().map(|v| fmt_num(*v)).collect();
            Ok((
                vec![format!(
                    "{col} = percentiles_array(['{}'], {})",
                    p.field,
                    percents.join(", ")
                )],
                vec![col],
            ))
        }
        LeafAggregation::ExtendedStats(e) => {
            let stats: [(&str, String); 10] = [
                ("count", "count()".to_string()),
                ("min", format!("min(['{}'])", e.field)),
                ("max", format!("max(['{}'])", e.field)),
                ("avg", format!("avg(['{}'])", e.field)),
                ("sum", format!("sum(['{}'])", e.field)),
                ("sum_of_squares", format!("sum(['{0}'] * ['{0}'])", e.field)),
                ("std_deviation", format!("stdev(['{}'])", e.field)),
                ("std_deviation_population", format!("stdevp(['{}'])", e.field)),
                ("variance", format!("variance(['{}'])", e.field)),
                ("variance_population", format!("variancep(['{}'])", e.field)),
            ];
            let mut exprs = Vec::with_capacity(stats.len());
            let mut cols = Vec::with_capacity(stats.len());
            for (stat, func) in stats {
                let col = format!("['{name}%{stat}']");
                exprs.push(format!("{col} = {func}"));
                cols.push(col);
            }
            Ok((exprs, cols))
        }
        other => Err(Error::Compile(format!(
            "not a summarizable metric: {other:?}"
        ))),
    }
}

fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn descriptor_node(container: &AggregationContainer) -> AggNode {
    let kind = match &container.primary {
        LeafAggregation::Avg(_)
        | LeafAggregation::Cardinality(_)
        | LeafAggregation::Min(_)
        | LeafAggregation::Max(_) => AggKind::Value,
        LeafAggregation::Percentiles(p) => AggKind::Percentiles {
            percents: p.percents(),
        },
        LeafAggregation::ExtendedStats(e) => AggKind::ExtendedStats { sigma: e.sigma() },
        LeafAggregation::TopHits(t) => AggKind::TopHits {
            field: t
                .docvalue_fields
                .first()
                .map(|d| d.name().to_string())
                .unwrap_or_default(),
        },
        LeafAggregation::DateHistogram(_) => AggKind::DateHistogram,
        LeafAggregation::Histogram(_) => AggKind::Histogram,
        LeafAggregation::Terms(_) => AggKind::Terms,
        LeafAggregation::Range(r) => AggKind::Range {
            entries: r
                .ranges
                .iter()
                .map(|spec: &RangeBucketSpec| RangeEntry {
                    label: spec.label(),
                    from: spec.from,
                    to: spec.to,
                })
                .collect(),
        },
        LeafAggregation::DateRange(r) => AggKind::DateRange {
            entries: r
                .ranges
                .iter()
                .map(|spec: &DateRangeBucketSpec| DateRangeEntry {
                    label: spec.label(),
                    from: spec.from.clone(),
                    to: spec.to.clone(),
                })
                .collect(),
        },
        LeafAggregation::Filters(f) => AggKind::Filters {
            labels: f.filters.iter().map(|(label, _)| label.clone()).collect(),
        },
    };
    AggNode {
        kind,
        children: container
            .sub_aggregations
            .iter()
            .map(|(name, child)| (name.clone(), descriptor_node(child)))
            .collect(),
    }
}
