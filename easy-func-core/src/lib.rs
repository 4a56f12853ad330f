#![doc = "easy-func-core: core pipeline library for easy-func."]

//! This crate holds the deployment pipeline, its data model and the contracts
//! for every external collaborator (source control, object storage, function
//! platform). Concrete cloud bindings live in the `easy-func` crate.
//!
//! # Usage
//! Build a [`deploy::Deployer`] from a [`config::DeployConfig`], an object
//! storage client and a function platform client, then call
//! [`deploy::Deployer::deploy`] with a [`contract::DeploymentTarget`] and an
//! [`contract::AccessToken`].

pub mod config;
pub mod contract;
pub mod deploy;
pub mod entry_point;
pub mod error;
pub mod package;
pub mod provision;
pub mod source;
pub mod store;

/// File extension of recognised function sources, without the leading dot.
pub const SOURCE_EXTENSION: &str = "py";
