//! Concrete protocol ingestors. Each registers itself with the
//! [`crate::registry::FactoryRegistry`] under its `(type, protocol)` key.

pub mod discord;
pub mod poll;
pub mod webhook;
