//! Project-wide constants.

use std::time::Duration;

pub const PROJECT_NAME: &str = "aio_dashboard";

pub const PROJECT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub const PROJECT_DISPLAY_NAME: &str = PROJECT_NAME;

pub const PROJECT_DESCRIPTION: &str = "鸿凯数据备份与恢复管理系统";

/// Install location of the service binary and its configs.
pub const PROJECT_BASE_DIR: &str = "/usr/sbin/aio/dashboard";

/// systemd `[Unit]` dependency directives, comma separated.
pub const PROJECT_DEPENDS: &str = "Requires=network.target,After=network-online.target syslog.target";

pub const PROJECT_DOMAIN: &str = "http://127.0.0.1";

pub const PROJECT_PORT: u16 = 9999;

pub const PROJECT_ACCESS_LOG_FILE: &str = "aio_dashboard-access.log";

pub const PROJECT_CRON_LOG_FILE: &str = "aio_dashboard-crontab.log";

/// Written next to the binary once `install` has succeeded.
pub const PROJECT_INSTALL_MARK: &str = "INSTALL.lock";

pub const HEADER_LOGIN_TOKEN: &str = "Token";

pub const HEADER_SIGN_TOKEN: &str = "Authorization";

pub const HEADER_SIGN_TOKEN_DATE: &str = "Authorization-Date";

pub const HEADER_SIGN_TOKEN_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub const REDIS_KEY_PREFIX_LOGIN_USER: &str = "aio_dashboard:login-user:";

pub const REDIS_KEY_PREFIX_SIGNATURE: &str = "aio_dashboard:signature:";

pub const ZH_CN: &str = "zh-cn";

pub const EN_US: &str = "en-us";

pub const MAX_REQUESTS_PER_SECOND: u32 = 10_000;

pub const LOGIN_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
