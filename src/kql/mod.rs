//! KustoQL generation: the bottom-up fold over the query tree, the
//! staged aggregation pipeline, and final command assembly.

pub mod aggs_builder;
pub mod compile;
pub mod query_builder;
