use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

const TPS_ENV_VAR: &str = "TILEHAND_TPS";
const THRUPORT_PORT_ENV_VAR: &str = "TILEHAND_THRUPORT_PORT";
const THRUPORT_DIAG_ENV_VAR: &str = "TILEHAND_THRUPORT_DIAG";
const TELEMETRY_EVERY_ENV_VAR: &str = "TILEHAND_TELEMETRY_EVERY";
const RUN_TICKS_ENV_VAR: &str = "TILEHAND_RUN_TICKS";

pub(crate) const THRUPORT_DEFAULT_PORT: u16 = 46001;
const DEFAULT_TELEMETRY_EVERY: u32 = 30;
const MAX_TICKS_PER_SECOND: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ConfigError {
    #[error("{var}='{value}' is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{var}={value} is outside {min}..={max}")]
    OutOfRange {
        var: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HostConfig {
    pub(crate) ticks_per_second: u32,
    pub(crate) thruport_port: u16,
    pub(crate) thruport_diag: bool,
    /// Ticks between telemetry frames; 0 disables them.
    pub(crate) telemetry_every: u32,
    /// Stop after this many ticks. Unset or 0 runs until the process is killed.
    pub(crate) run_ticks: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: engine::DEFAULT_TICKS_PER_SECOND,
            thruport_port: THRUPORT_DEFAULT_PORT,
            thruport_diag: false,
            telemetry_every: DEFAULT_TELEMETRY_EVERY,
            run_ticks: None,
        }
    }
}

impl HostConfig {
    pub(crate) fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Invalid values warn and fall back to the default for that field only.
    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let ticks_per_second = resolve(
            lookup(TPS_ENV_VAR).as_deref(),
            defaults.ticks_per_second,
            |value| parse_ranged(TPS_ENV_VAR, value, 1, MAX_TICKS_PER_SECOND),
        );
        let thruport_port = resolve(
            lookup(THRUPORT_PORT_ENV_VAR).as_deref(),
            defaults.thruport_port,
            |value| parse_value(THRUPORT_PORT_ENV_VAR, value, "u16 port"),
        );
        let telemetry_every = resolve(
            lookup(TELEMETRY_EVERY_ENV_VAR).as_deref(),
            defaults.telemetry_every,
            |value| parse_value(TELEMETRY_EVERY_ENV_VAR, value, "tick count"),
        );
        let run_ticks = resolve(lookup(RUN_TICKS_ENV_VAR).as_deref(), 0u64, |value| {
            parse_value(RUN_TICKS_ENV_VAR, value, "tick count")
        });

        Self {
            ticks_per_second,
            thruport_port,
            thruport_diag: parse_flag(lookup(THRUPORT_DIAG_ENV_VAR).as_deref()),
            telemetry_every,
            run_ticks: (run_ticks > 0).then_some(run_ticks),
        }
    }
}

fn resolve<T, P>(raw: Option<&str>, fallback: T, parse: P) -> T
where
    T: Display,
    P: Fn(&str) -> Result<T, ConfigError>,
{
    let Some(value) = raw else {
        return fallback;
    };
    match parse(value.trim()) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(error = %error, fallback = %fallback, "host_config_invalid_using_default");
            fallback
        }
    }
}

fn parse_value<T: FromStr>(
    var: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
        expected,
    })
}

fn parse_ranged(var: &'static str, value: &str, min: u32, max: u32) -> Result<u32, ConfigError> {
    let parsed: u32 = parse_value(var, value, "positive integer")?;
    if (min..=max).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(ConfigError::OutOfRange {
            var,
            value: parsed,
            min,
            max,
        })
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("1"))
}
