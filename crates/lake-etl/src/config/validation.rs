//! Configuration validation.

use super::Config;
use crate::error::{EtlError, Result};

const SSL_MODES: [&str; 4] = ["disable", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.as_os_str().is_empty() {
        return Err(EtlError::Config("source.path is required".into()));
    }

    // Target validation
    if config.target.url.trim().is_empty() {
        return Err(EtlError::Config("target.url is required".into()));
    }
    let ssl_mode = config.target.ssl_mode.to_lowercase();
    if !SSL_MODES.contains(&ssl_mode.as_str()) {
        return Err(EtlError::Config(format!(
            "target.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            config.target.ssl_mode
        )));
    }

    if config.etl.batch_size == 0 {
        return Err(EtlError::Config("etl.batch_size must be at least 1".into()));
    }

    Ok(())
}
