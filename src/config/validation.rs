//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (intervals > 0, parseable addresses)
//! - Detect colliding bus addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: MeshConfig -> Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::MeshConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a valid socket address")]
    InvalidBindAddress(String),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("registry.unhealthy_threshold must be at least 1")]
    ThresholdTooLow,
    #[error("bus address '{0}' is used by more than one path setting")]
    DuplicateAddress(String),
    #[error("{0} must not be empty")]
    EmptyAddress(&'static str),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &MeshConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.registry.ping_interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval("registry.ping_interval_ms"));
    }
    if config.registry.timeout_ms == 0 {
        errors.push(ValidationError::ZeroInterval("registry.timeout_ms"));
    }
    if config.ws.lock_timeout_ms == 0 {
        errors.push(ValidationError::ZeroInterval("ws.lock_timeout_ms"));
    }
    if config.gateway.dispatch_timeout_ms == 0 {
        errors.push(ValidationError::ZeroInterval("gateway.dispatch_timeout_ms"));
    }
    if config.registry.unhealthy_threshold < 1 {
        errors.push(ValidationError::ThresholdTooLow);
    }

    let addresses = [
        ("registry.register_path", &config.registry.register_path),
        ("registry.unregister_path", &config.registry.unregister_path),
        ("registry.registry_get_path", &config.registry.registry_get_path),
        (
            "registry.registry_register_path",
            &config.registry.registry_register_path,
        ),
        ("ws.reply_path", &config.ws.reply_path),
        ("ws.reply_all_path", &config.ws.reply_all_path),
        (
            "ws.reply_all_but_sender_path",
            &config.ws.reply_all_but_sender_path,
        ),
    ];

    let mut seen = HashSet::new();
    for (field, address) in addresses {
        if address.is_empty() {
            errors.push(ValidationError::EmptyAddress(field));
        } else if !seen.insert(address.clone()) {
            errors.push(ValidationError::DuplicateAddress(address.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MeshConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = MeshConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.registry.ping_interval_ms = 0;
        config.registry.unregister_path = config.registry.register_path.clone();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidBindAddress("not-an-addr".into())));
        assert!(errors.contains(&ValidationError::ZeroInterval("registry.ping_interval_ms")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateAddress(_))));
    }
}
