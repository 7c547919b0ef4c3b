use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::notify::telegram::DEFAULT_API_URL;
use crate::runtime::docker::DEFAULT_VERSION_LABEL;

const ENV_PREFIX: &str = "TELEPOD_";
const TOKEN_FILE_ENV: &str = "TELEPOD_TELEGRAM_BOT_TOKEN_FILE";

#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    // Required; left out of the defaults so extraction reports them missing.
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "string_or_number"
    )]
    pub telegram_chat_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,
    pub version_label: String,
    pub notify_timeout_secs: u64,
    /// Unset: run one pass and exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_chat_id: String::new(),
            telegram_bot_token: String::new(),
            telegram_api_url: DEFAULT_API_URL.into(),
            state_path: None,
            docker_socket: None,
            version_label: DEFAULT_VERSION_LABEL.into(),
            notify_timeout_secs: 10,
            poll_interval_secs: None,
            pass_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("telepod.toml"))
            .merge(Json::file("telepod.json"))
            .merge(Env::prefixed(ENV_PREFIX));

        // Support Docker-style secrets
        if let Ok(secret_file) = std::env::var(TOKEN_FILE_ENV) {
            let token = std::fs::read_to_string(&secret_file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", secret_file, e))?;
            figment = figment.merge(Serialized::default(
                "telegram_bot_token",
                token.trim().to_string(),
            ));
        }

        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.telegram_chat_id.trim().is_empty(),
            "telegram_chat_id must not be empty"
        );
        anyhow::ensure!(
            !self.telegram_bot_token.trim().is_empty(),
            "telegram_bot_token must not be empty"
        );
        anyhow::ensure!(
            !self.version_label.is_empty(),
            "version_label must not be empty"
        );
        anyhow::ensure!(
            self.poll_interval_secs != Some(0),
            "poll_interval_secs must be positive"
        );
        Ok(())
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    pub fn pass_timeout(&self) -> Option<Duration> {
        self.pass_timeout_secs.map(Duration::from_secs)
    }
}

/// Chat ids are numeric, and env/TOML values that look like numbers are
/// parsed as such.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

// Logged at startup; the bot token must not end up in the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("state_path", &self.state_path)
            .field("docker_socket", &self.docker_socket)
            .field("version_label", &self.version_label)
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("pass_timeout_secs", &self.pass_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load() -> Result<Config, figment::Error> {
        Config::load().map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn env_only_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEPOD_TELEGRAM_CHAT_ID", "-100200");
            jail.set_env("TELEPOD_TELEGRAM_BOT_TOKEN", "123:abc");

            let cfg = load()?;
            assert_eq!(cfg.telegram_chat_id, "-100200");
            assert_eq!(cfg.telegram_bot_token, "123:abc");
            assert_eq!(cfg.telegram_api_url, DEFAULT_API_URL);
            assert_eq!(cfg.version_label, DEFAULT_VERSION_LABEL);
            assert_eq!(cfg.notify_timeout(), Duration::from_secs(10));
            assert_eq!(cfg.poll_interval(), None);
            assert_eq!(cfg.state_path, None);
            Ok(())
        });
    }

    #[test]
    fn missing_chat_id_fails() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEPOD_TELEGRAM_BOT_TOKEN", "123:abc");
            let err = Config::load().unwrap_err().to_string();
            assert!(err.contains("telegram_chat_id"), "{err}");
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_overridden_by_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "telepod.toml",
                r#"
                telegram_chat_id = -1001234
                telegram_bot_token = "from-file"
                state_path = "/tmp/telepod/db.json"
                poll_interval_secs = 300
                version_label = "com.example.build"
                "#,
            )?;
            jail.set_env("TELEPOD_TELEGRAM_BOT_TOKEN", "from-env");

            let cfg = load()?;
            assert_eq!(cfg.telegram_chat_id, "-1001234");
            assert_eq!(cfg.telegram_bot_token, "from-env");
            assert_eq!(cfg.state_path, Some(PathBuf::from("/tmp/telepod/db.json")));
            assert_eq!(cfg.poll_interval(), Some(Duration::from_secs(300)));
            assert_eq!(cfg.version_label, "com.example.build");
            Ok(())
        });
    }

    #[test]
    fn token_can_come_from_secret_file() {
        Jail::expect_with(|jail| {
            jail.create_file("token", "999:secret\n")?;
            let token_path = jail.directory().join("token");
            jail.set_env("TELEPOD_TELEGRAM_CHAT_ID", "42");
            jail.set_env(TOKEN_FILE_ENV, token_path.display());

            let cfg = load()?;
            assert_eq!(cfg.telegram_bot_token, "999:secret");
            Ok(())
        });
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEPOD_TELEGRAM_CHAT_ID", "42");
            jail.set_env("TELEPOD_TELEGRAM_BOT_TOKEN", "123:abc");
            jail.set_env("TELEPOD_POLL_INTERVAL_SECS", 0);
            assert!(Config::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = Config {
            telegram_bot_token: "123:abc".into(),
            ..Default::default()
        };
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("123:abc"));
    }
}
