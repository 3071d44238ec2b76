//! Adapters between the workflow and files: scenario input and the CSV event log.

pub mod csv;
pub mod json;
