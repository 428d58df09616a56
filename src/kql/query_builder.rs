//! Assembles the complete search command from its pieces.

use tracing::debug;

use crate::config::Settings;
use crate::dsl::request::SearchRequest;
use crate::error::Error;
use crate::kql::aggs_builder::{self, AggregationsDescriptor};
use crate::kql::compile::{compile_query, compile_sort, escape_string};

/// The compiled command plus the shape information the result mapper
/// needs afterwards.
#[derive(Debug)]
pub struct TranslatedQuery {
    pub kql: String,
    pub descriptor: AggregationsDescriptor,
}

/// Translate a search request against one index into a single KQL
/// command. The command carries up to three projected tables: `aggs`,
/// `metadata`, and `hits`.
pub fn build(
    settings: &Settings,
    index: &str,
    request: &SearchRequest,
) -> Result<TranslatedQuery, Error> {
    settings.validate()?;

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("set servertimeout = {};", settings.server_timeout()));
    lines.push(
        "let fromUnixTimeMilli = (t:long) { datetime(1970-01-01) + t * 1millisec };".to_string(),
    );

    let mut data = format!("let _data = database(\"{}\").['{}']", settings.database, index);
    if let Some(query) = request.query_tree()? {
        for stage in compile_query(&query)? {
            data.push_str("\n| ");
            data.push_str(&stage);
        }
    }
    data.push(';');
    lines.push(data);

    let aggs = request.aggregation_tree()?;
    let descriptor = if aggs.is_empty() {
        AggregationsDescriptor::default()
    } else {
        let pipeline = aggs_builder::build(&aggs)?;
        lines.extend(pipeline.statements);
        lines.push(format!("({} | as aggs);", pipeline.final_expr));
        if !pipeline.metadata.is_empty() {
            lines.push(format!("({} | as metadata);", metadata_datatable(&pipeline.metadata)));
        }
        pipeline.descriptor
    };

    let size = request.size();
    if size > 0 {
        let mut hits = String::from("(_data");
        let orderings: Vec<String> = request
            .sort
            .iter()
            .map(compile_sort)
            .filter(|s| !s.is_empty())
            .collect();
        if !orderings.is_empty() {
            hits.push_str(&format!("\n| order by {}", orderings.join(", ")));
        }
        hits.push_str(&format!("\n| limit {size}\n| as hits)"));
        lines.push(hits);
    }

    let kql = lines.join("\n");
    debug!(%index, "compiled search command:\n{kql}");
    Ok(TranslatedQuery { kql, descriptor })
}

fn metadata_datatable(rows: &[(String, String)]) -> String {
    let cells: Vec<String> = rows
        .iter()
        .flat_map(|(key, value)| {
            [
                format!("\"{}\"", escape_string(key)),
                format!("\"{}\"", escape_string(value)),
            ]
        })
        .collect();
    format!(
        "datatable(['key']:string, ['value']:string)[{}]",
        cells.join(", ")
    )
}
