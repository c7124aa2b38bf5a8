//! Daemon configuration.
//!
//! Read once at startup from `TICKWATCH_*` environment variables. Hiding
//! timeout, snooze clear time and notification preferences can be changed
//! later through the settings endpoint; the rest needs a restart.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use time::Time;

use crate::error::{Error, Result};
use crate::notify::NotificationPrefs;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:7878";
pub const DEFAULT_HIDING_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Longest hide cooldown accepted from configuration or settings.
pub const MAX_HIDING_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_SNOOZE_CLEAR_TIME: Time = time::macros::time!(09:00);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// API listen address.
    pub listen: SocketAddr,

    /// Directory holding the JSON store files.
    pub data_dir: PathBuf,

    /// How long a hidden symbol stays in cooldown before it is forgotten.
    pub hiding_timeout: Duration,

    /// Local time of day at which the snooze list is emptied.
    pub snooze_clear_time: Time,

    pub notifications: NotificationPrefs,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 7878)),
            data_dir: default_data_dir(None),
            hiding_timeout: DEFAULT_HIDING_TIMEOUT,
            snooze_clear_time: DEFAULT_SNOOZE_CLEAR_TIME,
            notifications: NotificationPrefs::default(),
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen = match get("TICKWATCH_LISTEN") {
            Some(raw) => raw.trim().parse().map_err(|e| config_error("TICKWATCH_LISTEN", e))?,
            None => DEFAULT_LISTEN
                .parse()
                .map_err(|e| config_error("TICKWATCH_LISTEN", e))?,
        };

        let data_dir = match get("TICKWATCH_DATA_DIR") {
            Some(raw) => PathBuf::from(raw),
            None => default_data_dir(lookup("HOME")),
        };

        let hiding_timeout = match get("TICKWATCH_HIDING_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse()
                    .map_err(|e| config_error("TICKWATCH_HIDING_TIMEOUT_SECS", e))?;
                hiding_timeout_from_secs("TICKWATCH_HIDING_TIMEOUT_SECS", secs)?
            }
            None => DEFAULT_HIDING_TIMEOUT,
        };

        let snooze_clear_time = match get("TICKWATCH_SNOOZE_CLEAR_TIME") {
            Some(raw) => clock_time(&raw).ok_or_else(|| Error::Config {
                key: "TICKWATCH_SNOOZE_CLEAR_TIME".into(),
                reason: format!("expected HH:MM, got {raw:?}"),
            })?,
            None => DEFAULT_SNOOZE_CLEAR_TIME,
        };

        let defaults = NotificationPrefs::default();
        let flag = |key: &str, default: bool| -> Result<bool> {
            match get(key) {
                Some(raw) => parse_bool(&raw).ok_or_else(|| Error::Config {
                    key: key.into(),
                    reason: format!("expected true or false, got {raw:?}"),
                }),
                None => Ok(default),
            }
        };
        let notifications = NotificationPrefs {
            in_app: flag("TICKWATCH_NOTIFY_IN_APP", defaults.in_app)?,
            desktop: flag("TICKWATCH_NOTIFY_DESKTOP", defaults.desktop)?,
            sound: flag("TICKWATCH_NOTIFY_SOUND", defaults.sound)?,
        };

        Ok(Self {
            listen,
            data_dir,
            hiding_timeout,
            snooze_clear_time,
            notifications,
        })
    }
}

/// Validate a hide cooldown given in seconds.
pub fn hiding_timeout_from_secs(key: &str, secs: u64) -> Result<Duration> {
    let timeout = Duration::from_secs(secs);
    if timeout > MAX_HIDING_TIMEOUT {
        return Err(Error::Config {
            key: key.into(),
            reason: format!(
                "{secs} s exceeds the maximum of {} s",
                MAX_HIDING_TIMEOUT.as_secs()
            ),
        });
    }
    Ok(timeout)
}

/// Parse an `HH:MM` time of day.
pub fn parse_clock_time(raw: &str) -> Result<Time> {
    clock_time(raw).ok_or_else(|| Error::Config {
        key: "snooze_clear_time".into(),
        reason: format!("expected HH:MM, got {raw:?}"),
    })
}

fn clock_time(raw: &str) -> Option<Time> {
    let (hour, minute) = raw.trim().split_once(':')?;
    if minute.len() != 2 {
        return None;
    }
    Time::from_hms(hour.parse().ok()?, minute.parse().ok()?, 0).ok()
}

/// Format a time of day as `HH:MM`.
pub fn format_clock_time(time: Time) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_data_dir(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home).join(".local/share/tickwatch"),
        None => PathBuf::from(".tickwatch"),
    }
}

fn config_error(key: &str, e: impl std::fmt::Display) -> Error {
    Error::Config {
        key: key.into(),
        reason: e.to_string(),
    }
}
