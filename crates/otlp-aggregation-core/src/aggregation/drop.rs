//! Aggregation which drops data on the floor.

/// Aggregation cell which stores nothing.
#[derive(Debug, Default)]
pub struct DropAggregation {}
