//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset or unparsable numeric values fall
//! back to their defaults; identities (wallet address, channel names) and
//! inconsistent timings are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{Address, ChannelId};
use crate::error::ConfigError;
use crate::service::{DispatcherConfig, ReconnectPolicy};

/// Top-level client configuration.
///
/// Loaded once at startup via [`NotifyConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Push channel WebSocket URL.
    pub push_url: String,

    /// Identity service base URL.
    pub identity_url: String,

    /// File backing the session store.
    pub session_file: PathBuf,

    /// Wallet to connect at startup, if any.
    pub wallet_address: Option<Address>,

    /// Channels subscribed at startup.
    pub channels: Vec<ChannelId>,

    /// Capacity of the bounded notification log.
    pub log_capacity: usize,

    /// How long a dismissed id still counts as a duplicate.
    pub dismiss_retention: Duration,

    /// Per-channel rate limit as `(max events, window)`; `None` disables it.
    pub rate_limit: Option<(usize, Duration)>,

    /// Time a toast stays visible.
    pub toast_ttl: Duration,

    /// Maximum number of simultaneously visible toasts.
    pub toast_max_visible: usize,

    /// Interval between liveness pings.
    pub ping_interval: Duration,

    /// First reconnect delay.
    pub reconnect_base: Duration,

    /// Upper bound on reconnect delays.
    pub reconnect_max: Duration,

    /// Timeout for identity service requests.
    pub http_timeout: Duration,

    /// Emit logs as JSON (`LOG_FORMAT=json`).
    pub log_json: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            push_url: "ws://localhost:3000/ws".to_string(),
            identity_url: "http://localhost:3000".to_string(),
            session_file: PathBuf::from(".hydra-notify/session.json"),
            wallet_address: None,
            channels: vec![ChannelId::global()],
            log_capacity: 50,
            dismiss_retention: Duration::from_secs(60),
            rate_limit: Some((20, Duration::from_millis(1_000))),
            toast_ttl: Duration::from_millis(5_000),
            toast_max_visible: 5,
            ping_interval: Duration::from_secs(25),
            reconnect_base: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(30_000),
            http_timeout: Duration::from_secs(10),
            log_json: false,
        }
    }
}

impl NotifyConfig {
    /// Loads configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for a malformed
    /// `WALLET_ADDRESS`, [`ConfigError::InvalidChannel`] for a bad entry in
    /// `NOTIFY_CHANNELS`, and [`ConfigError::InvalidValue`] for a zero ping
    /// interval, a zero rate limit or a reconnect base above the maximum.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env(lookup);

        let wallet_address = env
            .string("WALLET_ADDRESS")
            .map(|raw| Address::parse(&raw))
            .transpose()?;

        let channels = match env.string("NOTIFY_CHANNELS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ChannelId::parse)
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.channels,
        };

        let rate_limit = if env.bool("RATE_LIMIT_ENABLED", true) {
            let max_events = env.parse("RATE_LIMIT_MAX_EVENTS", 20_usize);
            if max_events == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "RATE_LIMIT_MAX_EVENTS",
                    message: "must be greater than zero; set RATE_LIMIT_ENABLED=false instead"
                        .to_string(),
                });
            }
            let window = Duration::from_millis(env.parse("RATE_LIMIT_WINDOW_MS", 1_000));
            if window.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: "RATE_LIMIT_WINDOW_MS",
                    message: "must be greater than zero".to_string(),
                });
            }
            Some((max_events, window))
        } else {
            None
        };

        let ping_interval = Duration::from_secs(env.parse("PING_INTERVAL_SECS", 25));
        if ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PING_INTERVAL_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        let reconnect_base = Duration::from_millis(env.parse("RECONNECT_BASE_MS", 1_000));
        let reconnect_max = Duration::from_millis(env.parse("RECONNECT_MAX_MS", 30_000));
        if reconnect_base > reconnect_max {
            return Err(ConfigError::InvalidValue {
                key: "RECONNECT_BASE_MS",
                message: format!(
                    "{}ms exceeds RECONNECT_MAX_MS ({}ms)",
                    reconnect_base.as_millis(),
                    reconnect_max.as_millis()
                ),
            });
        }

        Ok(Self {
            push_url: env.string("PUSH_URL").unwrap_or(defaults.push_url),
            identity_url: env.string("IDENTITY_URL").unwrap_or(defaults.identity_url),
            session_file: env
                .string("SESSION_FILE")
                .map_or(defaults.session_file, PathBuf::from),
            wallet_address,
            channels,
            log_capacity: env.parse("NOTIFICATION_LOG_CAPACITY", defaults.log_capacity),
            dismiss_retention: Duration::from_secs(env.parse("DISMISS_RETENTION_SECS", 60)),
            rate_limit,
            toast_ttl: Duration::from_millis(env.parse("TOAST_TTL_MS", 5_000)),
            toast_max_visible: env.parse("TOAST_MAX_VISIBLE", defaults.toast_max_visible),
            ping_interval,
            reconnect_base,
            reconnect_max,
            http_timeout: Duration::from_secs(env.parse("HTTP_TIMEOUT_SECS", 10)),
            log_json: env
                .string("LOG_FORMAT")
                .is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Dispatcher settings.
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            capacity: self.log_capacity,
            dismiss_retention: self.dismiss_retention,
            rate_limit: self.rate_limit,
        }
    }

    /// Reconnect settings.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: self.reconnect_base,
            max: self.reconnect_max,
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Non-empty value of `key`.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parses `key` as `T`, returning `default` on missing or invalid values.
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Parses `key` as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
    /// (case-insensitive). Returns `default` otherwise.
    fn bool(&self, key: &str, default: bool) -> bool {
        match self.string(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            _ => default,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<NotifyConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        NotifyConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let Ok(config) = load(&[]) else {
            panic!("defaults must load");
        };
        assert_eq!(config, NotifyConfig::default());
        assert_eq!(config.channels, vec![ChannelId::global()]);
        assert_eq!(config.rate_limit, Some((20, Duration::from_secs(1))));
        assert!(config.wallet_address.is_none());
    }

    #[test]
    fn values_override_defaults() {
        let Ok(config) = load(&[
            ("PUSH_URL", "wss://push.example/ws"),
            ("WALLET_ADDRESS", "0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD"),
            ("NOTIFY_CHANNELS", "events:global, wallet:alerts ,"),
            ("NOTIFICATION_LOG_CAPACITY", "10"),
            ("RATE_LIMIT_ENABLED", "FALSE"),
            ("TOAST_TTL_MS", "2500"),
            ("LOG_FORMAT", "JSON"),
        ]) else {
            panic!("valid config");
        };
        assert_eq!(config.push_url, "wss://push.example/ws");
        assert_eq!(
            config.wallet_address.map(|a| a.to_string()),
            Some("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".to_string())
        );
        let names: Vec<&str> = config.channels.iter().map(ChannelId::as_str).collect();
        assert_eq!(names, vec!["events:global", "wallet:alerts"]);
        assert_eq!(config.log_capacity, 10);
        assert!(config.rate_limit.is_none());
        assert_eq!(config.toast_ttl, Duration::from_millis(2_500));
        assert!(config.log_json);
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let Ok(config) = load(&[("NOTIFICATION_LOG_CAPACITY", "lots")]) else {
            panic!("numbers fall back");
        };
        assert_eq!(config.log_capacity, 50);
    }

    #[test]
    fn bad_wallet_address_is_rejected() {
        let result = load(&[("WALLET_ADDRESS", "0x123")]);
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn bad_channel_is_rejected() {
        let result = load(&[("NOTIFY_CHANNELS", "events:global,has space")]);
        assert!(matches!(result, Err(ConfigError::InvalidChannel(_))));
    }

    #[test]
    fn inconsistent_timings_are_rejected() {
        let result = load(&[("RECONNECT_BASE_MS", "60000")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "RECONNECT_BASE_MS",
                ..
            })
        ));
        let result = load(&[("PING_INTERVAL_SECS", "0")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn zero_rate_limit_is_rejected_unless_disabled() {
        let result = load(&[("RATE_LIMIT_MAX_EVENTS", "0")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_MAX_EVENTS",
                ..
            })
        ));
        let result = load(&[("RATE_LIMIT_WINDOW_MS", "0")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_WINDOW_MS",
                ..
            })
        ));

        let Ok(config) = load(&[("RATE_LIMIT_ENABLED", "false"), ("RATE_LIMIT_MAX_EVENTS", "0")])
        else {
            panic!("disabled limiter ignores its settings");
        };
        assert_eq!(config.rate_limit, None);
    }
}
