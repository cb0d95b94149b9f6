//! Runtime environment selection.
//!
//! The environment is resolved once from the command line and passed down
//! explicitly. It picks the config file and tags every log event.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development.
    Dev,
    /// Functional acceptance testing.
    #[default]
    Fat,
    /// User acceptance testing, pre-release.
    Uat,
    /// Production.
    Pro,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Fat,
        Environment::Uat,
        Environment::Pro,
    ];

    pub fn value(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Fat => "fat",
            Environment::Uat => "uat",
            Environment::Pro => "pro",
        }
    }

    pub fn is_dev(&self) -> bool {
        *self == Environment::Dev
    }

    pub fn is_fat(&self) -> bool {
        *self == Environment::Fat
    }

    pub fn is_uat(&self) -> bool {
        *self == Environment::Uat
    }

    pub fn is_pro(&self) -> bool {
        *self == Environment::Pro
    }

    /// Exact, case-insensitive match on the short name.
    pub fn try_parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|env| env.value().eq_ignore_ascii_case(raw))
    }

    /// Resolve the `--env` flag. Missing or unknown values fall back to
    /// `fat`; the second element reports whether the fallback was taken.
    pub fn resolve(raw: Option<&str>) -> (Self, bool) {
        match raw.and_then(Self::try_parse) {
            Some(env) => (env, false),
            None => (Environment::Fat, true),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
