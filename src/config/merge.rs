//! Merge rules: defaults first, later sources override earlier ones key by key.

mod merge_policy;

pub use merge_policy::builder_with_defaults;
