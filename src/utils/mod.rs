//! Shared utilities.

pub mod json_ext;
