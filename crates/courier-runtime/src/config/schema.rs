//! Configuration schema.
//!
//! ```toml
//! # courier.toml
//! modules = ["my_app::orders", "my_app::billing"]
//! slow_send_threshold_ms = 250
//! ```

use std::time::Duration;

use courier_core::MediatorOptions;
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Mediator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Module path prefixes whose linked handlers are registered, one module each.
    pub modules: Vec<String>,

    /// Sends slower than this are logged at `warn`.
    pub slow_send_threshold_ms: Option<u64>,
}

impl MediatorConfig {
    /// The runtime part of the configuration.
    pub fn options(&self) -> MediatorOptions {
        MediatorOptions {
            slow_send_threshold: self.slow_send_threshold_ms.map(Duration::from_millis),
        }
    }

    /// Checks that every module prefix looks like a Rust path.
    pub fn validate(&self) -> ConfigResult<()> {
        for module in &self.modules {
            let valid = !module.is_empty()
                && module.split("::").all(|segment| {
                    !segment.is_empty()
                        && segment
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_')
                });
            if !valid {
                return Err(ConfigError::validation(format!(
                    "`{module}` is not a module path"
                )));
            }
        }
        if self.slow_send_threshold_ms == Some(0) {
            return Err(ConfigError::validation(
                "slow_send_threshold_ms must be positive",
            ));
        }
        Ok(())
    }
}
