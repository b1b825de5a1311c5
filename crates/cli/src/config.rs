use std::path::PathBuf;
use std::time::Duration;

use tellmemo_client::api::TellMeMoApi;
use tellmemo_client::channel::ChannelConfig;
use tellmemo_core::roles::OrgRole;

pub const ENV_API_URL: &str = "TELLMEMO_API_URL";
pub const ENV_WS_URL: &str = "TELLMEMO_WS_URL";
pub const ENV_TOKEN: &str = "TELLMEMO_TOKEN";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "TELLMEMO_CONNECT_TIMEOUT_SECS";
pub const ENV_HEARTBEAT_SECS: &str = "TELLMEMO_HEARTBEAT_SECS";
pub const ENV_DEFAULT_INVITE_ROLE: &str = "TELLMEMO_DEFAULT_INVITE_ROLE";
pub const ENV_INVITE_DELAY_MS: &str = "TELLMEMO_INVITE_DELAY_MS";
pub const ENV_PREFS_PATH: &str = "TELLMEMO_PREFS_PATH";

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the API.
    pub api_url: String,
    /// WebSocket base URL; `/ws/jobs` is appended.
    pub ws_url: String,
    /// Bearer token for REST calls and the job channel.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Role used for CSV rows with a missing or unknown role.
    pub default_invite_role: OrgRole,
    /// Pause between invitations during a bulk send.
    pub invite_delay: Duration,
    pub prefs_path: PathBuf,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                      |
    /// |---------------------------------|------------------------------|
    /// | `TELLMEMO_API_URL`              | `http://localhost:8000`      |
    /// | `TELLMEMO_WS_URL`               | `ws://localhost:8000`        |
    /// | `TELLMEMO_TOKEN`                | --                           |
    /// | `TELLMEMO_CONNECT_TIMEOUT_SECS` | `10`                         |
    /// | `TELLMEMO_HEARTBEAT_SECS`       | `30`                         |
    /// | `TELLMEMO_DEFAULT_INVITE_ROLE`  | `member`                     |
    /// | `TELLMEMO_INVITE_DELAY_MS`      | `300`                        |
    /// | `TELLMEMO_PREFS_PATH`           | `.tellmemo/preferences.json` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = var(ENV_API_URL).unwrap_or_else(|| "http://localhost:8000".into());
        check_scheme(ENV_API_URL, &api_url, &["http://", "https://"])?;

        let ws_url = var(ENV_WS_URL).unwrap_or_else(|| "ws://localhost:8000".into());
        check_scheme(ENV_WS_URL, &ws_url, &["ws://", "wss://"])?;

        let connect_timeout_secs = parse_u64(ENV_CONNECT_TIMEOUT_SECS, var(ENV_CONNECT_TIMEOUT_SECS), 10)?;
        let heartbeat_secs = parse_u64(ENV_HEARTBEAT_SECS, var(ENV_HEARTBEAT_SECS), 30)?;
        if heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                var: ENV_HEARTBEAT_SECS,
                value: "0".into(),
                expected: "a positive number of seconds",
            });
        }
        let invite_delay_ms = parse_u64(ENV_INVITE_DELAY_MS, var(ENV_INVITE_DELAY_MS), 300)?;

        let default_invite_role = match var(ENV_DEFAULT_INVITE_ROLE) {
            Some(value) => OrgRole::from_str(&value.to_lowercase()).map_err(|_| ConfigError::Invalid {
                var: ENV_DEFAULT_INVITE_ROLE,
                value,
                expected: "one of admin, member, viewer",
            })?,
            None => OrgRole::default(),
        };

        let prefs_path = var(ENV_PREFS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".tellmemo/preferences.json"));

        Ok(Self {
            api_url,
            ws_url,
            token: var(ENV_TOKEN),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            default_invite_role,
            invite_delay: Duration::from_millis(invite_delay_ms),
            prefs_path,
        })
    }

    /// Replace the base URLs with command-line values, checked like their
    /// environment counterparts.
    pub fn with_url_overrides(
        mut self,
        api_url: Option<String>,
        ws_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(api_url) = api_url {
            check_scheme("--api-url", &api_url, &["http://", "https://"])?;
            self.api_url = api_url;
        }
        if let Some(ws_url) = ws_url {
            check_scheme("--ws-url", &ws_url, &["ws://", "wss://"])?;
            self.ws_url = ws_url;
        }
        Ok(self)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        let mut config = ChannelConfig::new(self.ws_url.clone(), self.token.clone());
        config.connect_timeout = self.connect_timeout;
        config.heartbeat_interval = self.heartbeat_interval;
        config
    }

    pub fn api(&self) -> TellMeMoApi {
        TellMeMoApi::new(self.api_url.clone()).with_token(self.token.clone())
    }
}

fn parse_u64(var: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected: "a non-negative integer",
        }),
        None => Ok(default),
    }
}

fn check_scheme(var: &'static str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if schemes.iter().any(|s| url.starts_with(s)) {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        var,
        value: url.to_string(),
        expected: if schemes[0].starts_with("ws") {
            "a ws:// or wss:// URL"
        } else {
            "an http:// or https:// URL"
        },
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.token, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.default_invite_role, OrgRole::Member);
        assert_eq!(config.invite_delay, Duration::from_millis(300));
        assert_eq!(config.prefs_path, PathBuf::from(".tellmemo/preferences.json"));
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            (ENV_WS_URL, "wss://api.example.com"),
            (ENV_TOKEN, "abc"),
            (ENV_DEFAULT_INVITE_ROLE, "Viewer"),
            (ENV_INVITE_DELAY_MS, "0"),
        ])
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.default_invite_role, OrgRole::Viewer);
        assert!(config.invite_delay.is_zero());

        let channel = config.channel_config();
        assert_eq!(channel.ws_url, "wss://api.example.com");
        assert_eq!(channel.token.as_deref(), Some("abc"));
    }

    #[test]
    fn url_overrides_replace_env_values() {
        let config = load(&[(ENV_WS_URL, "ws://env:1")])
            .unwrap()
            .with_url_overrides(Some("https://flag".into()), Some("wss://flag".into()))
            .unwrap();
        assert_eq!(config.api_url, "https://flag");
        assert_eq!(config.ws_url, "wss://flag");

        let untouched = load(&[]).unwrap().with_url_overrides(None, None).unwrap();
        assert_eq!(untouched.ws_url, "ws://localhost:8000");
    }

    #[test]
    fn url_overrides_with_wrong_scheme_are_rejected() {
        let result = load(&[]).unwrap().with_url_overrides(None, Some("http://x".into()));
        assert_matches!(
            result,
            Err(ConfigError::Invalid { var: "--ws-url", ref value, .. }) if value == "http://x"
        );

        let result = load(&[]).unwrap().with_url_overrides(Some("ws://x".into()), None);
        assert_matches!(result, Err(ConfigError::Invalid { var: "--api-url", .. }));
    }

    #[test]
    fn blank_token_is_none() {
        assert_eq!(load(&[(ENV_TOKEN, "  ")]).unwrap().token, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_matches!(
            load(&[(ENV_HEARTBEAT_SECS, "soon")]),
            Err(ConfigError::Invalid { var: ENV_HEARTBEAT_SECS, .. })
        );
        assert_matches!(
            load(&[(ENV_HEARTBEAT_SECS, "0")]),
            Err(ConfigError::Invalid { var: ENV_HEARTBEAT_SECS, .. })
        );
        assert_matches!(
            load(&[(ENV_DEFAULT_INVITE_ROLE, "superadmin")]),
            Err(ConfigError::Invalid { var: ENV_DEFAULT_INVITE_ROLE, .. })
        );
        assert_matches!(
            load(&[(ENV_WS_URL, "http://wrong")]),
            Err(ConfigError::Invalid { var: ENV_WS_URL, .. })
        );
    }
}
