//! Logging setup
//!
//! The library only emits `tracing` events. As a dependency it installs
//! nothing and the host application's subscriber decides what is shown.
//! Standalone tools call `init_logging` once at startup with
//! `LogMode::Standalone`, which installs a formatting subscriber filtered
//! by a package level and a root level. `RUST_LOG` overrides both.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target prefix of every event this crate emits
pub const PACKAGE_TARGET: &str = env!("CARGO_CRATE_NAME");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Respect the host application's subscriber
    #[default]
    Library,
    /// Install a subscriber for this process
    Standalone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub mode: LogMode,
    /// Level for this crate's events
    pub package_level: String,
    /// Level for everything else
    pub root_level: String,
    /// Per-dependency overrides, e.g. `{"polars": "error"}`
    pub dependency_levels: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            mode: LogMode::Library,
            package_level: "info".to_string(),
            root_level: "warn".to_string(),
            dependency_levels: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    pub fn standalone() -> Self {
        Self {
            mode: LogMode::Standalone,
            ..Self::default()
        }
    }

    pub fn with_package_level(mut self, level: &str) -> Self {
        self.package_level = level.to_string();
        self
    }

    pub fn with_dependency_level(mut self, dependency: &str, level: &str) -> Self {
        self.dependency_levels
            .insert(dependency.to_string(), level.to_string());
        self
    }

    /// `EnvFilter` directive string for this configuration
    pub fn filter_directive(&self) -> String {
        let mut directives = vec![
            self.root_level.clone(),
            format!("{}={}", PACKAGE_TARGET, self.package_level),
        ];
        directives.extend(
            self.dependency_levels
                .iter()
                .map(|(dep, level)| format!("{}={}", dep, level)),
        );
        directives.join(",")
    }
}

/// Configure logging according to `config.mode`
///
/// Returns `true` if a subscriber was installed.
///
/// # Errors
/// Invalid level names, or a global subscriber already being installed.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    match config.mode {
        LogMode::Library => {
            debug!("library logging mode, leaving subscriber setup to the application");
            Ok(false)
        }
        LogMode::Standalone => {
            let filter = match EnvFilter::try_from_default_env() {
                Ok(filter) => filter,
                Err(_) => EnvFilter::try_new(config.filter_directive())
                    .with_context(|| format!("Invalid log levels: {}", config.filter_directive()))?,
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .context("A global tracing subscriber is already installed")?;

            info!(
                package_level = %config.package_level,
                root_level = %config.root_level,
                "configured standalone logging"
            );
            Ok(true)
        }
    }
}
