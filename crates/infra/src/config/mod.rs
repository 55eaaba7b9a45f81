//! Configuration loading
//!
//! Reads the engine configuration from a TOML or JSON file and applies
//! `SYNCLANE_*` environment overrides on top.

pub mod loader;

pub use loader::{apply_env_overrides, load, load_from_file, probe_config_paths};
