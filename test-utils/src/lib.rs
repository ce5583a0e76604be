//! Shared test utilities for the crypto pipeline crates.
//!
//! This crate provides:
//! - Proptest generators for algorithms, keys and payloads
//! - Recording and scripted test doubles for sinks, collectors and providers
//! - Ready-made configurations and decorator collaborators

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use fixtures::*;
pub use generators::*;
pub use mocks::*;
