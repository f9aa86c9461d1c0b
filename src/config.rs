//! Environment-driven settings. `.env` is loaded by the binary before this runs.

use std::env;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_RELAY_PREFIX: &str = "https://thingproxy.freeboard.io/fetch/";
pub const DEFAULT_LOG_FILE: &str = "logs/ward_ops_report.log";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub gps_base_url: Option<String>,
    pub gps_primary_key: Option<String>,
    pub gps_secondary_key: Option<String>,
    pub relay_prefix: String,
    pub direct_timeout: Duration,
    pub relay_timeout: Duration,
    pub log_file_path: String,
    /// Settings that were present but unusable, as (name, value). Logged once
    /// the subscriber is up, see [`AppConfig::log_ignored`].
    pub ignored: Vec<(String, String)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            gps_base_url: None,
            gps_primary_key: None,
            gps_secondary_key: None,
            relay_prefix: DEFAULT_RELAY_PREFIX.to_string(),
            direct_timeout: Duration::from_secs(15),
            relay_timeout: Duration::from_secs(30),
            log_file_path: DEFAULT_LOG_FILE.to_string(),
            ignored: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any name → value lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = AppConfig::default();
        let mut ignored = Vec::new();
        let mut secs = |name: &str, default: Duration| match get(name) {
            None => default,
            Some(v) => match v.parse::<u64>() {
                Ok(s) if s > 0 => Duration::from_secs(s),
                _ => {
                    ignored.push((name.to_string(), v));
                    default
                }
            },
        };
        let direct_timeout = secs("GPS_DIRECT_TIMEOUT_SECS", defaults.direct_timeout);
        let relay_timeout = secs("GPS_RELAY_TIMEOUT_SECS", defaults.relay_timeout);

        AppConfig {
            gps_base_url: get("GPS_BASE_URL"),
            gps_primary_key: get("GPS_PRIMARY_KEY"),
            gps_secondary_key: get("GPS_SECONDARY_KEY"),
            relay_prefix: get("GPS_RELAY_PREFIX").unwrap_or(defaults.relay_prefix),
            direct_timeout,
            relay_timeout,
            log_file_path: get("LOG_FILE_PATH").unwrap_or(defaults.log_file_path),
            ignored,
        }
    }

    /// Warns about every ignored setting. Call after logging is initialised.
    pub fn log_ignored(&self) {
        for (name, value) in &self.ignored {
            warn!(setting = %name, value = %value, "Ignoring invalid setting, using default");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.direct_timeout, Duration::from_secs(15));
        assert_eq!(cfg.relay_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_values_are_read_and_trimmed() {
        let cfg = config(&[
            ("GPS_BASE_URL", " https://vendor.test/api.php "),
            ("GPS_PRIMARY_KEY", "abc"),
            ("GPS_SECONDARY_KEY", ""),
            ("GPS_DIRECT_TIMEOUT_SECS", "5"),
            ("GPS_RELAY_TIMEOUT_SECS", "soon"),
        ]);
        assert_eq!(cfg.gps_base_url.as_deref(), Some("https://vendor.test/api.php"));
        assert_eq!(cfg.gps_primary_key.as_deref(), Some("abc"));
        assert_eq!(cfg.gps_secondary_key, None);
        assert_eq!(cfg.direct_timeout, Duration::from_secs(5));
        assert_eq!(cfg.relay_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.ignored,
            vec![("GPS_RELAY_TIMEOUT_SECS".to_string(), "soon".to_string())]
        );
    }

    #[test]
    fn test_zero_timeout_is_recorded_as_ignored() {
        let cfg = config(&[("GPS_DIRECT_TIMEOUT_SECS", "0")]);
        assert_eq!(cfg.direct_timeout, Duration::from_secs(15));
        assert_eq!(cfg.ignored.len(), 1);
        assert_eq!(cfg.ignored[0].0, "GPS_DIRECT_TIMEOUT_SECS");
    }
}
