//! Built-in service connectors.

pub mod github;
