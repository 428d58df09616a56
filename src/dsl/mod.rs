//! Elasticsearch Query DSL model and deserialization.
//!
//! Dispatch is discriminator-keyed: the single property name of each JSON
//! clause object selects the constructor. Unrecognized discriminators are
//! dropped, not rejected; see `query::Query::from_value`.

pub mod aggs;
pub mod query;
pub mod request;
