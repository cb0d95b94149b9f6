//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! dashboard backend. All types derive Serde traits for deserialization
//! from `configs/<env>_configs.toml`.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants;
use crate::core::MuxOptions;

/// Root configuration for the dashboard backend.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Service identity and listener.
    pub basic: BasicSettings,

    /// PostgreSQL connection.
    pub postgresql: PostgresqlSettings,

    /// Redis connection.
    pub redis: RedisSettings,

    /// Request pipeline limits.
    pub http: HttpSettings,

    /// Log sinks.
    pub log: LogSettings,

    /// Prometheus exporter.
    pub metrics: MetricsSettings,
}

/// Service identity, install metadata and listener address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BasicSettings {
    pub name: String,
    pub version: String,

    /// How the service was started (`console` or `systemd`).
    pub startup_mode: String,

    pub display_name: String,
    pub description: String,

    /// systemd `[Unit]` directives, comma separated.
    pub srv_depends: String,

    #[serde(rename = "srv_http_ip")]
    pub srv_ip: String,

    #[serde(rename = "srv_http_port")]
    pub srv_port: u16,

    /// Directory holding the access and cron logs.
    pub global_log_path: String,
}

impl Default for BasicSettings {
    fn default() -> Self {
        Self {
            name: constants::PROJECT_NAME.to_string(),
            version: constants::PROJECT_VERSION.to_string(),
            startup_mode: "console".to_string(),
            display_name: constants::PROJECT_DISPLAY_NAME.to_string(),
            description: constants::PROJECT_DESCRIPTION.to_string(),
            srv_depends: constants::PROJECT_DEPENDS.to_string(),
            srv_ip: "0.0.0.0".to_string(),
            srv_port: constants::PROJECT_PORT,
            global_log_path: "./logs".to_string(),
        }
    }
}

impl BasicSettings {
    /// Listener address, `srv_http_ip:srv_http_port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.srv_ip, self.srv_port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db: String,

    /// Seconds a pooled connection may live.
    #[serde(rename = "conn_max_life_time")]
    pub conn_max_lifetime: u64,

    pub max_idle_conn: u32,
    pub max_open_conn: u32,
}

impl Default for PostgresqlSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            db: constants::PROJECT_NAME.to_string(),
            conn_max_lifetime: 60,
            max_idle_conn: 10,
            max_open_conn: 60,
        }
    }
}

impl PostgresqlSettings {
    /// libpq keyword/value connection string.
    pub fn dsn(&self) -> String {
        let mut dsn = format!(
            "host={} port={} user={} dbname={} sslmode=disable",
            self.host, self.port, self.user, self.db
        );
        if !self.password.is_empty() {
            dsn.push_str(&format!(" password={}", self.password));
        }
        dsn
    }

    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: u8,
    pub max_retries: u32,
    pub min_idle_conn: u32,
    pub pool_size: u32,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            max_retries: 3,
            min_idle_conn: 5,
            pool_size: 10,
        }
    }
}

impl RedisSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `redis://` URL including password and database index.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr(), self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr(), self.db)
        }
    }
}

/// Request pipeline limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Largest request body captured per request, in bytes.
    pub body_limit: usize,

    /// Total time allowed per request.
    pub request_timeout_secs: u64,

    /// Released contexts kept for reuse.
    pub pool_max_idle: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let mux = MuxOptions::default();
        Self {
            body_limit: mux.body_limit,
            request_timeout_secs: mux.request_timeout.as_secs(),
            pool_max_idle: mux.pool_max_idle,
        }
    }
}

impl HttpSettings {
    pub fn mux_options(&self) -> MuxOptions {
        MuxOptions {
            body_limit: self.body_limit,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            pool_max_idle: self.pool_max_idle,
            ..MuxOptions::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Also write to stdout.
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,

    /// Prometheus scrape listener.
    pub address: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9100".to_string(),
        }
    }
}

impl MetricsSettings {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.basic.name, "aio_dashboard");
        assert_eq!(settings.basic.bind_address(), "0.0.0.0:9999");
        assert_eq!(settings.redis.addr(), "127.0.0.1:6379");
        assert!(!settings.metrics.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [basic]
            srv_http_port = 8088

            [redis]
            password = "s3cret"
            db = 2
            "#,
        )
        .unwrap();
        assert_eq!(settings.basic.srv_port, 8088);
        assert_eq!(settings.basic.srv_ip, "0.0.0.0");
        assert_eq!(settings.redis.url(), "redis://:s3cret@127.0.0.1:6379/2");
        assert_eq!(settings.postgresql.port, 5432);
    }

    #[test]
    fn test_postgres_dsn() {
        let mut pg = PostgresqlSettings::default();
        assert!(!pg.dsn().contains("password"));
        pg.password = "pw".to_string();
        assert!(pg.dsn().ends_with("password=pw"));
        assert_eq!(pg.conn_max_lifetime(), Duration::from_secs(60));
    }

    #[test]
    fn test_http_settings_feed_mux() {
        let http = HttpSettings {
            body_limit: 10,
            request_timeout_secs: 3,
            pool_max_idle: 2,
        };
        let options = http.mux_options();
        assert_eq!(options.body_limit, 10);
        assert_eq!(options.request_timeout, Duration::from_secs(3));
        assert_eq!(options.pool_max_idle, 2);
        assert!(options.record_metrics);
    }
}
