// file: src/logging/mod.rs
// version: 1.0.0
// guid: b7e2f8a4-c631-4d95-8b12-f09a7e3c64d8

//! Logging system for the cluster bootstrapper

pub mod logger;

pub use logger::init_logger;
