// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a pipeline file from disk (`loader.rs`).
//! - Validate basic invariants like graph correctness (`validate.rs`).
//! - Turn a validated file into [`crate::node::Node`]s (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::nodes_from_config;
pub use loader::{config_base_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, NodeConfig, RawConfigFile};
