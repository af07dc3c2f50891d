//! Configuration for the load generator.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `LOADTEST__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `LOADTEST__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `LOADTEST__HOST=http://10.0.0.5:8080` sets the service under test
//! - `LOADTEST__DURATION=5m` sets the run length
//! - `LOADTEST__LOGGING__LEVEL=debug` sets the log level
//!
//! # YAML Configuration File
//!
//! ```yaml
//! host: http://10.0.0.5:8080
//! duration: 5m
//!
//! users:
//!   - scenario: mixed
//!     count: 50
//!   - scenario: search
//!     count: 10
//!     wait_time:
//!       min: 100ms
//!       max: 500ms
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::runner::WaitTime;
use crate::scenario::ScenarioKind;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "LOADTEST__";

/// A group of simulated users running the same scenario.
///
/// Used in: [`Config::users`]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Users {
    /// The scenario every user of this group runs.
    pub scenario: ScenarioKind,

    /// Number of concurrent users.
    pub count: usize,

    /// Pause between two tasks of a user.
    ///
    /// # Default
    ///
    /// `0s` for both `min` and `max`, so requests are issued back-to-back.
    #[serde(default)]
    pub wait_time: WaitTime,
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, the report goes to stdout.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `LOADTEST__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto`
    ///
    /// # Environment Variable
    ///
    /// `LOADTEST__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the load generator.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the service under test.
    ///
    /// # Default
    ///
    /// `http://localhost:8080`
    ///
    /// # Environment Variable
    ///
    /// `LOADTEST__HOST`
    pub host: String,

    /// How long users keep issuing requests.
    ///
    /// # Default
    ///
    /// `60s`
    ///
    /// # Environment Variable
    ///
    /// `LOADTEST__DURATION`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Timeout for a single request, from connecting until the response body is read.
    ///
    /// Requests exceeding it are recorded as failures.
    ///
    /// # Default
    ///
    /// `60s`
    ///
    /// # Environment Variable
    ///
    /// `LOADTEST__TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Groups of simulated users. All groups run concurrently.
    ///
    /// # Default
    ///
    /// A single group of 10 users running the `mixed` scenario.
    pub users: Vec<Users>,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_owned(),
            duration: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            users: vec![Users {
                scenario: ScenarioKind::Mixed,
                count: 10,
                wait_time: WaitTime::default(),
            }],
            logging: Logging::default(),
        }
    }
}

/// Semantic errors in an otherwise well-formed configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The run would end immediately.
    #[error("duration must be greater than zero")]
    ZeroDuration,
    /// No user group is configured.
    #[error("at least one user group is required")]
    NoUsers,
    /// A group would not start any user.
    #[error("user group {index} ({scenario}) has no users")]
    EmptyGroup {
        /// Position of the group in [`Config::users`].
        index: usize,
        /// The scenario of the group.
        scenario: ScenarioKind,
    },
    /// The wait time range is inverted.
    #[error("user group {index} ({scenario}) has a wait_time min above max")]
    InvertedWaitTime {
        /// Position of the group in [`Config::users`].
        index: usize,
        /// The scenario of the group.
        scenario: ScenarioKind,
    },
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Checks values that parse fine but cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.users.is_empty() {
            return Err(ConfigError::NoUsers);
        }

        for (index, users) in self.users.iter().enumerate() {
            let scenario = users.scenario;
            if users.count == 0 {
                return Err(ConfigError::EmptyGroup { index, scenario });
            }
            if users.wait_time.min > users.wait_time.max {
                return Err(ConfigError::InvertedWaitTime { index, scenario });
            }
        }

        Ok(())
    }
}

impl fmt::Display for Users {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.scenario, self.count)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.host, "http://localhost:8080");
            assert_eq!(config.duration, Duration::from_secs(60));
            assert_eq!(config.users.len(), 1);
            assert_eq!(config.users[0].scenario, ScenarioKind::Mixed);
            assert_eq!(config.logging.level, LevelFilter::INFO);
            assert_eq!(config.validate(), Ok(()));

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LOADTEST__HOST", "http://3.89.25.212:8080");
            jail.set_env("LOADTEST__DURATION", "5m");
            jail.set_env("LOADTEST__TIMEOUT", "250ms");
            jail.set_env("LOADTEST__LOGGING__LEVEL", "debug");
            jail.set_env("LOADTEST__LOGGING__FORMAT", "json");

            let config = Config::load(None).unwrap();

            assert_eq!(config.host, "http://3.89.25.212:8080");
            assert_eq!(config.duration, Duration::from_secs(300));
            assert_eq!(config.timeout, Duration::from_millis(250));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            host: http://search:8080
            duration: 30s
            users:
              - scenario: search
                count: 25
                wait_time:
                  min: 100ms
                  max: 500ms
              - scenario: write_only
                count: 5
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.host, "http://search:8080");
            assert_eq!(config.duration, Duration::from_secs(30));
            assert_eq!(config.users.len(), 2);

            let search = &config.users[0];
            assert_eq!(search.scenario, ScenarioKind::Search);
            assert_eq!(search.count, 25);
            assert_eq!(search.wait_time.min, Duration::from_millis(100));
            assert_eq!(search.wait_time.max, Duration::from_millis(500));

            let writers = &config.users[1];
            assert_eq!(writers.scenario, ScenarioKind::WriteOnly);
            assert_eq!(writers.wait_time, WaitTime::default());

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(b"host: http://from-yaml:8080\nduration: 10s\n")
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("LOADTEST__HOST", "http://from-env:8080");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.host, "http://from-env:8080");
            assert_eq!(config.duration, Duration::from_secs(10));

            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_scenario() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(b"users:\n  - scenario: browse\n    count: 1\n")
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            assert!(Config::load(Some(tempfile.path())).is_err());
            Ok(())
        });
    }

    #[test]
    fn validation() {
        let mut config = Config::default();
        config.duration = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration));

        let mut config = Config::default();
        config.users.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoUsers));

        let mut config = Config::default();
        config.users[0].count = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyGroup {
                index: 0,
                scenario: ScenarioKind::Mixed
            })
        );

        let mut config = Config::default();
        config.users[0].wait_time = WaitTime {
            min: Duration::from_secs(2),
            max: Duration::from_secs(1),
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedWaitTime {
                index: 0,
                scenario: ScenarioKind::Mixed
            })
        );
    }
}
