use std::collections::HashSet;
use std::path::PathBuf;

use chrono::FixedOffset;

use crate::engine::BookingWorkflow;

/// Server settings, read from `SPACEBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    /// Login names allowed to manage spaces and confirm bookings.
    pub admin_users: HashSet<String>,
    pub workflow: BookingWorkflow,
    /// Offset of the service's local time from UTC. Booking dates and
    /// times are interpreted in this offset.
    pub utc_offset: FixedOffset,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &'static str,
            default: T,
        ) -> Result<T, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid { var, value }),
            }
        }

        let metrics_port = match lookup("SPACEBOOK_METRICS_PORT") {
            None => None,
            Some(value) => Some(value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "SPACEBOOK_METRICS_PORT",
                value,
            })?),
        };

        let workflow = match lookup("SPACEBOOK_BOOKING_WORKFLOW") {
            None => BookingWorkflow::default(),
            Some(value) => BookingWorkflow::parse(&value).ok_or(ConfigError::Invalid {
                var: "SPACEBOOK_BOOKING_WORKFLOW",
                value,
            })?,
        };

        let offset_minutes: i32 = parsed(&lookup, "SPACEBOOK_UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or(ConfigError::Invalid {
            var: "SPACEBOOK_UTC_OFFSET_MINUTES",
            value: offset_minutes.to_string(),
        })?;

        let admin_users = lookup("SPACEBOOK_ADMIN_USERS")
            .unwrap_or_else(|| "admin".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            port: parsed(&lookup, "SPACEBOOK_PORT", 5433)?,
            bind: lookup("SPACEBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: PathBuf::from(
                lookup("SPACEBOOK_DATA_DIR").unwrap_or_else(|| "./data".into()),
            ),
            password: lookup("SPACEBOOK_PASSWORD").unwrap_or_else(|| "spacebook".into()),
            max_connections: parsed(&lookup, "SPACEBOOK_MAX_CONNECTIONS", 256)?,
            compact_threshold: parsed(&lookup, "SPACEBOOK_COMPACT_THRESHOLD", 1000)?,
            tls_cert: lookup("SPACEBOOK_TLS_CERT"),
            tls_key: lookup("SPACEBOOK_TLS_KEY"),
            metrics_port,
            admin_users,
            workflow,
            utc_offset,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5433");
        assert_eq!(cfg.password, "spacebook");
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.workflow, BookingWorkflow::Direct);
        assert!(cfg.admin_users.contains("admin"));
        assert_eq!(cfg.utc_offset.local_minus_utc(), 0);
    }

    #[test]
    fn overrides() {
        let cfg = from(&[
            ("SPACEBOOK_PORT", "6000"),
            ("SPACEBOOK_ADMIN_USERS", "ops, facilities ,"),
            ("SPACEBOOK_BOOKING_WORKFLOW", "Approval"),
            ("SPACEBOOK_UTC_OFFSET_MINUTES", "-300"),
            ("SPACEBOOK_METRICS_PORT", "9090"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.admin_users.len(), 2);
        assert!(cfg.admin_users.contains("facilities"));
        assert_eq!(cfg.workflow, BookingWorkflow::Approval);
        assert_eq!(cfg.utc_offset.local_minus_utc(), -300 * 60);
        assert_eq!(cfg.metrics_port, Some(9090));
    }

    #[test]
    fn rejects_garbage() {
        let err = from(&[("SPACEBOOK_PORT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("SPACEBOOK_PORT"));
        assert!(from(&[("SPACEBOOK_BOOKING_WORKFLOW", "sometimes")]).is_err());
        assert!(from(&[("SPACEBOOK_UTC_OFFSET_MINUTES", "100000")]).is_err());
    }
}
