// file: src/cli/mod.rs
// version: 1.0.0
// guid: 4b07d2e9-61f8-4a53-9c24-e85a0f13d6c7

//! Command line interface for the cluster bootstrapper

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::*;
