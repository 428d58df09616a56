//! Field capabilities and index discovery.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::backend::DataTable;
use crate::error::Error;
use crate::response::{Aggregate, Bucket};

/// Map a backend column type name to its ES field type. Accepts both
/// bare (`Int64`) and namespaced (`System.Int64`) spellings.
pub fn es_type_for(backend_type: &str) -> Result<&'static str, Error> {
    let name = if backend_type.contains("SqlDecimal") {
        "SqlDecimal"
    } else {
        backend_type
            .strip_prefix("System.")
            .unwrap_or(backend_type)
    };
    match name {
        "Int32" => Ok("integer"),
        "Int64" => Ok("long"),
        "Single" => Ok("float"),
        "Double" | "SqlDecimal" => Ok("double"),
        "SByte" | "Boolean" => Ok("boolean"),
        "String" | "Guid" | "TimeSpan" => Ok("keyword"),
        "DateTime" => Ok("date"),
        "Object" => Ok("object"),
        _ => Err(Error::Schema(backend_type.to_string())),
    }
}

#[derive(Debug, Serialize)]
pub struct FieldCapsResponse {
    pub indices: Vec<String>,
    pub fields: BTreeMap<String, BTreeMap<String, FieldCapability>>,
}

#[derive(Debug, Serialize)]
pub struct FieldCapability {
    #[serde(rename = "type")]
    pub es_type: String,
    pub aggregatable: bool,
    pub searchable: bool,
}

/// Build the `_field_caps` response from a schema table. The table
/// carries one row per column; name/type column headers vary by control
/// command, so fall back to positional access.
pub fn map_field_caps(index: &str, tables: &[DataTable]) -> Result<FieldCapsResponse, Error> {
    let table = tables
        .first()
        .ok_or_else(|| Error::Execution("schema command returned no tables".to_string()))?;

    let name_idx = table
        .column_index("ColumnName")
        .or_else(|| table.column_index("AttributeName"))
        .unwrap_or(0);
    let type_idx = table
        .column_index("ColumnType")
        .or_else(|| table.column_index("AttributeType"))
        .unwrap_or(1);

    let mut fields = BTreeMap::new();
    for row in &table.rows {
        let name = row
            .get(name_idx)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Execution("schema row is missing a column name".to_string()))?;
        let backend_type = row
            .get(type_idx)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Execution("schema row is missing a column type".to_string()))?;
        let es_type = es_type_for(backend_type)?;

        let mut capability = BTreeMap::new();
        capability.insert(
            es_type.to_string(),
            FieldCapability {
                es_type: es_type.to_string(),
                aggregatable: true,
                searchable: true,
            },
        );
        fields.insert(name.to_string(), capability);
    }

    Ok(FieldCapsResponse {
        indices: vec![index.to_string()],
        fields,
    })
}

/// Discovered table names rendered in the terms-bucket shape Kibana's
/// index picker expects.
pub fn map_index_list(tables: &[DataTable]) -> Aggregate {
    let mut buckets = Vec::new();
    if let Some(table) = tables.first() {
        for row in &table.rows {
            if let Some(name) = row.first().and_then(Value::as_str) {
                buckets.push(Bucket {
                    key: Some(json!(name)),
                    doc_count: 1,
                    ..Bucket::default()
                });
            }
        }
    }
    Aggregate::Buckets { buckets }
}
