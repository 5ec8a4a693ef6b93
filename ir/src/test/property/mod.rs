//! Property-based tests for the graph IR.
//!
//! Uses proptest to verify invariants across wide input spaces.

#[cfg(test)]
mod quantize_props;
#[cfg(test)]
mod shape_props;
