// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded waits for deferred lock results.
//!
//! A [`LockTimeoutValue`] caps how long a caller blocks on a
//! [`LockFuture`](crate::locking::future::LockFuture) or on a retrying
//! acquisition. Values come from the CLI, the environment, or `config.toml`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Environment variable consulted for a process-wide wait override.
pub const LOCK_TIMEOUT_ENV: &str = "DISTLOCK_LOCK_TIMEOUT";

/// Default bound on a single store round trip awaited by the dispatch loop.
pub const DEFAULT_LOCK_WAIT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeoutValue {
    Finite(Duration),
    Infinite,
}

impl LockTimeoutValue {
    pub const fn from_secs(seconds: u64) -> Self {
        Self::Finite(Duration::from_secs(seconds))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::Finite(Duration::from_millis(millis))
    }

    /// Returns `None` for an unbounded wait.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            LockTimeoutValue::Finite(duration) => Some(*duration),
            LockTimeoutValue::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, LockTimeoutValue::Infinite)
    }
}

impl Default for LockTimeoutValue {
    fn default() -> Self {
        Self::from_secs(DEFAULT_LOCK_WAIT_SECS)
    }
}

impl fmt::Display for LockTimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeoutValue::Infinite => f.write_str("infinite"),
            LockTimeoutValue::Finite(duration) if duration.subsec_millis() != 0 => {
                write!(f, "{}ms", duration.as_millis())
            }
            LockTimeoutValue::Finite(duration) => write!(f, "{}s", duration.as_secs()),
        }
    }
}

impl Serialize for LockTimeoutValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LockTimeoutValue::Finite(duration) => serializer.serialize_u64(duration.as_secs()),
            LockTimeoutValue::Infinite => serializer.serialize_str("infinite"),
        }
    }
}

impl<'de> Deserialize<'de> for LockTimeoutValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(LockTimeoutValue::from_secs(seconds)),
            Raw::Text(text) => parse_timeout_override(&text).map_err(D::Error::custom),
        }
    }
}

/// Where the effective timeout came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutSource {
    #[default]
    Default,
    Config,
    Environment,
    Cli,
}

impl fmt::Display for LockTimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockTimeoutSource::Default => "built-in default",
            LockTimeoutSource::Config => "configuration file",
            LockTimeoutSource::Environment => "environment variable",
            LockTimeoutSource::Cli => "CLI flag",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeoutResolution {
    pub value: LockTimeoutValue,
    pub source: LockTimeoutSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeoutParseError {
    value: String,
}

impl fmt::Display for LockTimeoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lock timeout value '{}' is invalid. Use an integer number of seconds or the word \
             'infinite'.",
            self.value
        )
    }
}

impl std::error::Error for LockTimeoutParseError {}

/// Parses `"<seconds>"` or `"infinite"` (case-insensitive).
pub fn parse_timeout_override(value: &str) -> Result<LockTimeoutValue, LockTimeoutParseError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("infinite") {
        return Ok(LockTimeoutValue::Infinite);
    }

    trimmed
        .parse::<u64>()
        .map(LockTimeoutValue::from_secs)
        .map_err(|_| LockTimeoutParseError {
            value: trimmed.to_string(),
        })
}

/// Resolves the effective timeout with CLI > env > config > default precedence.
pub struct LockTimeoutResolver<'a> {
    cli_override: Option<&'a str>,
    env_override: Option<&'a str>,
    config_value: LockTimeoutValue,
    default_value: LockTimeoutValue,
}

impl<'a> LockTimeoutResolver<'a> {
    pub fn new(
        cli_override: Option<&'a str>,
        env_override: Option<&'a str>,
        config_value: LockTimeoutValue,
        default_value: LockTimeoutValue,
    ) -> Self {
        Self {
            cli_override,
            env_override,
            config_value,
            default_value,
        }
    }

    pub fn resolve(self) -> Result<LockTimeoutResolution, LockTimeoutParseError> {
        let (value, source) = if let Some(cli_value) = self.cli_override {
            (parse_timeout_override(cli_value)?, LockTimeoutSource::Cli)
        } else if let Some(env_value) = self.env_override {
            (
                parse_timeout_override(env_value)?,
                LockTimeoutSource::Environment,
            )
        } else if self.config_value != self.default_value {
            (self.config_value, LockTimeoutSource::Config)
        } else {
            (self.default_value, LockTimeoutSource::Default)
        };

        Ok(LockTimeoutResolution { value, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Serialize)]
    struct Holder {
        wait: LockTimeoutValue,
    }

    #[test]
    fn parse_accepts_seconds_and_infinite() {
        assert_eq!(
            parse_timeout_override(" 42 ").unwrap(),
            LockTimeoutValue::from_secs(42)
        );
        assert_eq!(
            parse_timeout_override("INFINITE").unwrap(),
            LockTimeoutValue::Infinite
        );
    }

    #[test]
    fn parse_rejects_negative_and_text() {
        for bad in ["-1", "soon", "1.5"] {
            let err = parse_timeout_override(bad).unwrap_err();
            assert!(err.to_string().contains(bad));
        }
    }

    #[test]
    fn cli_beats_environment() {
        let resolution = LockTimeoutResolver::new(
            Some("5"),
            Some("infinite"),
            LockTimeoutValue::from_secs(10),
            LockTimeoutValue::default(),
        )
        .resolve()
        .unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Cli);
        assert_eq!(resolution.value, LockTimeoutValue::from_secs(5));
    }

    #[test]
    fn environment_beats_config() {
        let resolution = LockTimeoutResolver::new(
            None,
            Some("infinite"),
            LockTimeoutValue::from_secs(10),
            LockTimeoutValue::default(),
        )
        .resolve()
        .unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Environment);
        assert!(resolution.value.is_infinite());
    }

    #[test]
    fn config_equal_to_default_reports_default() {
        let resolution = LockTimeoutResolver::new(
            None,
            None,
            LockTimeoutValue::default(),
            LockTimeoutValue::default(),
        )
        .resolve()
        .unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Default);
    }

    #[test]
    fn deserializes_numbers_and_keywords() {
        let finite: Holder = toml::from_str("wait = 12").unwrap();
        assert_eq!(finite.wait, LockTimeoutValue::from_secs(12));

        let infinite: Holder = toml::from_str(r#"wait = "infinite""#).unwrap();
        assert!(infinite.wait.is_infinite());

        let quoted: Holder = toml::from_str(r#"wait = "7""#).unwrap();
        assert_eq!(quoted.wait, LockTimeoutValue::from_secs(7));

        assert!(toml::from_str::<Holder>(r#"wait = "later""#).is_err());
    }

    #[test]
    fn display_uses_millis_for_fractions() {
        assert_eq!(LockTimeoutValue::from_secs(3).to_string(), "3s");
        assert_eq!(LockTimeoutValue::from_millis(250).to_string(), "250ms");
        assert_eq!(LockTimeoutValue::Infinite.to_string(), "infinite");
    }
}
