//! # Remote-side common library
//!
//! Shared infrastructure for the ingestion subsystem's remote-side
//! process: structured logging, the crate-wide error type, and the
//! `ConnectionSpec` / secrets-resolution layer that stands in for the
//! real interactive-setup collaborator.

pub mod config;
pub mod error;
pub mod key_bundle;
pub mod logging;

pub use error::{Error, Result};
