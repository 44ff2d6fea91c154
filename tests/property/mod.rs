//! Property-based tests for grouping and catalog invariants

mod grouping;
