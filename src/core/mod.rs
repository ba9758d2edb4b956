// src/core/mod.rs

pub mod capacitor_config;
pub mod collaborators;
pub mod config_loader;
pub mod ide;
pub mod manifest;
pub mod paths;
pub mod supervisor;
