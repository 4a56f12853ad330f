//! easy-func: command-line deployment of repository functions to Google Cloud.
//!
//! The pipeline itself lives in `easy-func-core`. This crate adds the YAML
//! configuration loader, Google credentials, and the Cloud Storage and Cloud
//! Functions bindings of the core's storage and platform contracts.

pub mod auth;
pub mod cli;
pub mod functions;
pub mod load_config;
pub mod storage;

pub use cli::{run, Cli, Commands};
