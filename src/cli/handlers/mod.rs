// src/cli/handlers/mod.rs

// One module per command; `commons` holds what they share.

pub mod build;
pub mod commons;
pub mod run;
