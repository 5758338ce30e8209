//! Tool domain model
//!
//! Definitions, calls, results, the permission gate, and parameter
//! validation. Execution itself lives in the infrastructure layer.

pub mod entities;
pub mod permission;
pub mod validate;
pub mod value_objects;
