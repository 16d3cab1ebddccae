//! Processor convergence controller library.
//!
//! This crate primarily ships a `processor-controller` binary, but we expose
//! a library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod materialize;
pub mod reconciler;
pub mod store;
