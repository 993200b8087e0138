//! Sage Tools
//!
//! Small, dependency-light helper functions used by the tool registry in
//! `sage-core`. Nothing here knows about HTTP, Diesel, or the agent loop;
//! each function is a pure transformation over its arguments.

pub mod finance;
pub mod path_safety;

pub use path_safety::{confine, truncate_with_marker, PathEscape};
