//! Functions Configuration
//!
//! The subset of project configuration the orchestrator reads: per-function
//! schedules, the local server address used to build function URLs, and
//! invocation timeouts.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::functions::errors::{FunctionError, FunctionResult};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};

/// Per-function settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSettings {
    /// Cron expression; a schedule declared in source takes precedence
    #[serde(default)]
    pub schedule: Option<String>,
}

/// Local server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Main dev server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Port of the functions server, used when `port` is unset
    #[serde(default = "default_functions_port")]
    pub functions_port: u16,

    /// Serve over TLS
    #[serde(default)]
    pub https: bool,

    /// Explicit protocol, overrides `https`
    #[serde(default)]
    pub protocol: Option<String>,
}

fn default_functions_port() -> u16 {
    34567
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: None,
            functions_port: default_functions_port(),
            https: false,
            protocol: None,
        }
    }
}

impl ServerSettings {
    /// Create settings for a specific port
    pub fn with_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(self.functions_port)
    }

    pub fn protocol(&self) -> &str {
        match &self.protocol {
            Some(protocol) => protocol.as_str(),
            None if self.https => "https",
            None => "http",
        }
    }

    /// Base URL of the local server
    pub fn base_url(&self) -> String {
        format!("{}://localhost:{}", self.protocol(), self.effective_port())
    }
}

/// Invocation timeouts, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_synchronous_timeout")]
    pub synchronous: u64,

    #[serde(default = "default_background_timeout")]
    pub background: u64,
}

fn default_synchronous_timeout() -> u64 {
    30
}

fn default_background_timeout() -> u64 {
    900
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            synchronous: default_synchronous_timeout(),
            background: default_background_timeout(),
        }
    }
}

/// Configuration read by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionsConfig {
    #[serde(default)]
    pub functions: HashMap<String, FunctionSettings>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Lowest severity written by the logger, e.g. `"WARN"`
    #[serde(default)]
    pub log_level: Option<Severity>,
}

impl FunctionsConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> FunctionResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FunctionError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            FunctionError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        if let Some(level) = config.log_level {
            Logger::set_min_severity(level);
        }

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", path.display().to_string().as_str()),
                ("functions", config.functions.len().to_string().as_str()),
            ],
        );

        Ok(config)
    }

    /// Schedule configured for a function, if any
    pub fn schedule_for(&self, name: &str) -> Option<&str> {
        self.functions
            .get(name)
            .and_then(|settings| settings.schedule.as_deref())
    }
}
