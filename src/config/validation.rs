//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, ports valid, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::IpAddr;

use crate::config::schema::Settings;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key, e.g. `basic.srv_http_port`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.basic.name.trim().is_empty() {
        errors.push(ValidationError::new("basic.name", "must not be empty"));
    }
    if settings.basic.srv_ip.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "basic.srv_http_ip",
            format!("'{}' is not an IP address", settings.basic.srv_ip),
        ));
    }
    if settings.basic.srv_port == 0 {
        errors.push(ValidationError::new("basic.srv_http_port", "must be non-zero"));
    }
    if settings.basic.global_log_path.trim().is_empty() {
        errors.push(ValidationError::new("basic.global_log_path", "must not be empty"));
    }

    if settings.postgresql.max_idle_conn > settings.postgresql.max_open_conn {
        errors.push(ValidationError::new(
            "postgresql.max_idle_conn",
            "must not exceed max_open_conn",
        ));
    }
    if settings.redis.pool_size == 0 {
        errors.push(ValidationError::new("redis.pool_size", "must be non-zero"));
    }
    if settings.redis.min_idle_conn > settings.redis.pool_size {
        errors.push(ValidationError::new(
            "redis.min_idle_conn",
            "must not exceed pool_size",
        ));
    }

    if settings.http.body_limit == 0 {
        errors.push(ValidationError::new("http.body_limit", "must be non-zero"));
    }
    if settings.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be non-zero"));
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&settings.log.level) {
        errors.push(ValidationError::new("log.level", e.to_string()));
    }
    if settings.metrics.enabled && settings.metrics.socket_addr().is_none() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("'{}' is not a socket address", settings.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
