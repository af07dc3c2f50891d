//! Test utilities for the load generator.
//!
//! This crate provides an in-process mock of the product catalog and search services, plus a
//! tracing initializer for tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
