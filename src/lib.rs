//! Elasticsearch-to-KustoQL translation engine.
//!
//! Accepts Elasticsearch Query DSL search bodies, compiles them into
//! KustoQL commands (including staged aggregation pipelines), and maps
//! the tabular results back into ES-shaped JSON that Kibana can render.
//!
//! The pipeline has four seams:
//!
//! 1. [`dsl`]: deserialize the request into a typed query and
//!    aggregation tree, dropping unrecognized clauses.
//! 2. [`kql`]: fold the tree into KQL text and assemble the full
//!    command with its `set`/`let` preamble.
//! 3. [`backend`]: hand the command to a [`QueryExecutor`]
//!    implementation and get typed tables back.
//! 4. [`response`]: reassemble rows into hits, buckets, and field
//!    capabilities; failures become the ES error envelope.

pub mod backend;
pub mod config;
pub mod datemath;
pub mod dsl;
pub mod error;
pub mod guid;
pub mod kql;
pub mod lucene;
pub mod response;
pub mod search;

pub use backend::{Column, DataTable, QueryExecutor};
pub use config::Settings;
pub use error::{Error, ErrorResponse};
pub use response::SearchResponse;
pub use search::{execute_search, field_caps, list_indices, search};

pub type Result<T> = std::result::Result<T, Error>;
