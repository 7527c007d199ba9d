//! Registry of built-in connectors.
//!
//! Every connector shipped with the hub is registered here once at startup.
//! A connector without OAuth client credentials still registers; only its
//! `connect`/`callback` fail until the credentials are configured.

use crate::connectors::github::GitHubConnector;
use area::config::AreaConfig;
use area::{AreaError, ConnectorRegistry};
use std::sync::Arc;

/// Builds the registry of all built-in connectors.
pub fn builtin_registry(config: &AreaConfig) -> Result<ConnectorRegistry, AreaError> {
    let github = GitHubConnector::new(config)
        .map_err(|e| AreaError::Configuration(format!("github connector: {:#}", e)))?;

    let registry = ConnectorRegistry::builder()
        .register(Arc::new(github))?
        .build();
    Ok(registry)
}
