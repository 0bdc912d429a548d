use std::{env, fmt, time::Duration};

use storage::RepositoryId;

use crate::error::{LibraryErr, Result};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

const HOST_SUFFIX_VAR: &str = "DML_HOST_SUFFIX";
const SECURE_VAR: &str = "DML_SECURE";
const RECONNECT_DELAY_VAR: &str = "DML_RECONNECT_DELAY_MS";

/// The coordinator's websocket url for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable settings for a library instance.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    host_suffix: String,
    secure: bool,
    reconnect_delay: Duration,
}

impl LibraryConfig {
    /// Creates a new library configuration.
    ///
    /// # Args
    /// * `host_suffix` - The coordinator's domain, appended to the repository id.
    ///
    /// # Returns
    /// A `LibraryConfig` using plain `ws` and a one second reconnect delay.
    pub fn new(host_suffix: impl Into<String>) -> Self {
        let host_suffix = host_suffix.into();

        Self {
            host_suffix: host_suffix.trim_start_matches('.').to_owned(),
            secure: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Reads the configuration from `DML_HOST_SUFFIX`, `DML_SECURE` and
    /// `DML_RECONNECT_DELAY_MS`.
    ///
    /// # Errors
    /// Returns `LibraryErr::InvalidConfig` if the host suffix is missing or a value can't be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` but reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host_suffix = lookup(HOST_SUFFIX_VAR)
            .filter(|suffix| !suffix.trim_start_matches('.').is_empty())
            .ok_or_else(|| LibraryErr::InvalidConfig(format!("{HOST_SUFFIX_VAR} is not set")))?;

        let mut config = Self::new(host_suffix);

        if let Some(secure) = lookup(SECURE_VAR) {
            config.secure = match secure.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(LibraryErr::InvalidConfig(format!(
                        "{SECURE_VAR} must be a boolean, got {other:?}"
                    )));
                }
            };
        }

        if let Some(delay) = lookup(RECONNECT_DELAY_VAR) {
            let millis = delay.parse::<u64>().map_err(|e| {
                LibraryErr::InvalidConfig(format!("{RECONNECT_DELAY_VAR}={delay:?}: {e}"))
            })?;
            config.reconnect_delay = Duration::from_millis(millis);
        }

        Ok(config)
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Derives the coordinator endpoint of a repository.
    ///
    /// # Returns
    /// `ws(s)://<repository id>.<host suffix>`.
    pub fn endpoint_for(&self, repo_id: &RepositoryId) -> Endpoint {
        let scheme = if self.secure { "wss" } else { "ws" };
        Endpoint(format!("{scheme}://{repo_id}.{}", self.host_suffix))
    }
}
