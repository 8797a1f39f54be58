//! envbake library
//!
//! Everything the `envbake` binary does is reachable from here so
//! integration tests (and other tools) can drive bakes in-process:
//! build a [`config::Config`], hand it to [`pipeline::run`].

pub mod config;
pub mod encode;
pub mod input;
pub mod pipeline;

pub use config::{Config, OutputFormat, OutputType};
