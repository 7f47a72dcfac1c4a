//! Harness configuration.
//!
//! [`HarnessConfig::load`] layers three sources with the `config` crate:
//! the embedded defaults below, an optional TOML file, and finally the
//! process environment. The environment is read exactly once, here; every
//! other component receives the resulting [`HarnessConfig`] by reference.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::{HarnessError, Result};

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
report_timeout     = "5m"
enable_aws_billing = false
poll_interval      = "5s"
readiness_timeout  = "1m"
collect_window     = "10m"
"#;

/// Base per-case timeout, as a duration string (`5m`, `90s`, `1h30m`).
pub const ENV_REPORT_TIMEOUT: &str = "REPORT_TEST_TIMEOUT";
/// Directory receiving report results and the run summary. Required.
pub const ENV_OUTPUT_DIR: &str = "TEST_RESULT_REPORT_OUTPUT_DIRECTORY";
/// Only the literal value `true` enables the billing-dependent cases.
pub const ENV_AWS_BILLING: &str = "ENABLE_AWS_BILLING_TESTS";
pub const ENV_POLL_INTERVAL: &str = "METERING_E2E_POLL_INTERVAL";
pub const ENV_READINESS_TIMEOUT: &str = "METERING_E2E_READINESS_TIMEOUT";
pub const ENV_COLLECT_WINDOW: &str = "METERING_E2E_COLLECT_WINDOW";

// ---------------------------------------------------------------------------
// Public config type
// ---------------------------------------------------------------------------

/// Validated, immutable run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Base timeout for a single report's lifecycle. Individual cases may
    /// add to it.
    pub report_timeout: Duration,
    pub output_dir: PathBuf,
    /// Enables the cases that depend on AWS billing data.
    pub enable_aws_billing: bool,
    /// Interval between two checks of any polled predicate.
    pub poll_interval: Duration,
    /// Outer bound for the table and generation-query readiness waits.
    pub readiness_timeout: Duration,
    /// Length of the window handed to the one-shot collection.
    pub collect_window: Duration,
}

/// Shape of the layered sources before durations are parsed.
#[derive(Debug, Deserialize)]
struct RawConfig {
    report_timeout: String,
    #[serde(default)]
    output_dir: Option<String>,
    enable_aws_billing: bool,
    poll_interval: String,
    readiness_timeout: String,
    collect_window: String,
}

impl HarnessConfig {
    /// Load from the process environment, optionally layered over a TOML
    /// file.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Load from an arbitrary environment lookup. Used directly by tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_sources(None, lookup)
    }

    pub fn from_sources(
        file: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));
        if let Some(path) = file {
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        let overrides: HashMap<&str, Option<String>> = HashMap::from([
            ("report_timeout", env(ENV_REPORT_TIMEOUT)),
            ("output_dir", env(ENV_OUTPUT_DIR)),
            ("poll_interval", env(ENV_POLL_INTERVAL)),
            ("readiness_timeout", env(ENV_READINESS_TIMEOUT)),
            ("collect_window", env(ENV_COLLECT_WINDOW)),
        ]);
        for (key, value) in overrides {
            builder = builder.set_override_option(key, value).map_err(config_error)?;
        }
        if let Some(toggle) = env(ENV_AWS_BILLING) {
            builder = builder
                .set_override("enable_aws_billing", toggle == "true")
                .map_err(config_error)?;
        }

        let raw: RawConfig = builder
            .build()
            .and_then(config::Config::try_deserialize::<RawConfig>)
            .map_err(config_error)?;

        let output_dir = raw
            .output_dir
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(HarnessError::MissingSetting {
                key: "output_dir",
                env: ENV_OUTPUT_DIR,
            })?;

        Ok(Self {
            report_timeout: parse_setting("report_timeout", &raw.report_timeout)?,
            output_dir,
            enable_aws_billing: raw.enable_aws_billing,
            poll_interval: parse_nonzero_setting("poll_interval", &raw.poll_interval)?,
            readiness_timeout: parse_nonzero_setting("readiness_timeout", &raw.readiness_timeout)?,
            collect_window: parse_setting("collect_window", &raw.collect_window)?,
        })
    }

    /// Create the output directory if it does not exist yet.
    pub fn prepare_output_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| HarnessError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })
    }
}

fn config_error(err: config::ConfigError) -> HarnessError {
    HarnessError::InvalidConfig {
        details: err.to_string(),
    }
}

fn parse_setting(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|_| HarnessError::InvalidConfig {
        details: format!("{key}: invalid duration {value:?}"),
    })
}

fn parse_nonzero_setting(key: &str, value: &str) -> Result<Duration> {
    let duration = parse_setting(key, value)?;
    if duration.is_zero() {
        return Err(HarnessError::InvalidConfig {
            details: format!("{key}: must be greater than zero, got {value:?}"),
        });
    }
    Ok(duration)
}

// ---------------------------------------------------------------------------
// Duration strings
// ---------------------------------------------------------------------------

static DURATION_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("duration pattern is valid")
});

/// Longest duration any setting accepts.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Parse a duration written as a sequence of `<number><unit>` segments, e.g.
/// `5m`, `1h30m`, `1.5s`, `250ms`. A bare `0` is accepted; anything longer
/// than [`MAX_DURATION`] is not.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    let invalid = || HarnessError::InvalidConfig {
        details: format!("invalid duration {input:?}"),
    };

    let mut cursor = 0;
    let mut seconds = 0f64;
    for caps in DURATION_SEGMENT.captures_iter(trimmed) {
        let (Some(whole), Some(value), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            return Err(invalid());
        };
        if whole.start() != cursor {
            return Err(invalid());
        }
        cursor = whole.end();

        let value: f64 = value.as_str().parse().map_err(|_| invalid())?;
        let scale = match unit.as_str() {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        seconds += value * scale;
    }

    if cursor == 0 || cursor != trimmed.len() {
        return Err(invalid());
    }
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if duration <= MAX_DURATION => Ok(duration),
        _ => Err(invalid()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
