// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::path::PathBuf;
use std::time::Duration;
use std::{fmt::Debug, fs::read_to_string};

use anyhow::{Context, Error, Result};
use config::{Config, ConfigBuilder, Environment, FileFormat, builder::DefaultState};
use serde::Deserialize;

use crate::model::Safety;

#[derive(Debug, Deserialize)]
pub(crate) struct Configuration {
    /// only needed to run the bot
    telegram: Option<TelegramConfiguration>,
    #[serde(default)]
    database: DatabaseConfiguration,
    #[serde(default)]
    broadcast: BroadcastConfiguration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TelegramConfiguration {
    token_file: PathBuf,
    #[serde(default = "default_api_url")]
    api_url: String,
    proxy: Option<String>,
    #[serde(default = "default_poll_timeout")]
    poll_timeout: u64,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

pub(crate) struct Telegram {
    token: String,
    api_url: String,
    proxy: Option<String>,
    poll_timeout: Duration,
}

impl Telegram {
    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub(crate) fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }
}

impl Debug for Telegram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telegram")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("proxy", &self.proxy)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

impl TryFrom<&TelegramConfiguration> for Telegram {
    type Error = Error;

    fn try_from(value: &TelegramConfiguration) -> std::result::Result<Self, Self::Error> {
        let token = read_to_string(&value.token_file)
            .with_context(|| format!("failed to read bot token from {:?}", value.token_file))?
            .trim()
            .to_string();

        Ok(Self {
            token,
            api_url: value.api_url.trim_end_matches('/').to_string(),
            proxy: value.proxy.clone(),
            poll_timeout: Duration::from_secs(value.poll_timeout),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DatabaseConfiguration {
    #[serde(default)]
    backend: Backend,
    url: String,
}

impl Default for DatabaseConfiguration {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            url: "iwallpapers.db".to_string(),
        }
    }
}

impl DatabaseConfiguration {
    pub(crate) fn backend(&self) -> Backend {
        self.backend
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }
}

/// Cadence and limits of the broadcast schedule; durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BroadcastConfiguration {
    cooldown: u64,
    poll_interval: u64,
    cycle_interval: u64,
    fan_out: usize,
    attempts: u32,
    backoff: u64,
    max_size: i64,
    max_width: i32,
    max_height: i32,
    safety: Safety,
}

impl Default for BroadcastConfiguration {
    fn default() -> Self {
        Self {
            cooldown: 5 * 60,
            poll_interval: 10,
            cycle_interval: 60,
            fan_out: 3,
            attempts: 3,
            backoff: 1,
            max_size: 5 * 1024 * 1024,
            max_width: 10_000,
            max_height: 10_000,
            safety: Safety::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Broadcast {
    pub(crate) cooldown: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) cycle_interval: Duration,
    pub(crate) fan_out: usize,
    pub(crate) attempts: u32,
    pub(crate) backoff: Duration,
    pub(crate) max_size: i64,
    pub(crate) max_width: i32,
    pub(crate) max_height: i32,
    /// safety filter of scheduled deliveries
    pub(crate) safety: Safety,
}

impl Default for Broadcast {
    fn default() -> Self {
        (&BroadcastConfiguration::default()).into()
    }
}

impl From<&BroadcastConfiguration> for Broadcast {
    fn from(value: &BroadcastConfiguration) -> Self {
        Self {
            cooldown: Duration::from_secs(value.cooldown),
            poll_interval: Duration::from_secs(value.poll_interval),
            cycle_interval: Duration::from_secs(value.cycle_interval),
            fan_out: value.fan_out.max(1),
            attempts: value.attempts.max(1),
            backoff: Duration::from_secs(value.backoff),
            max_size: value.max_size,
            max_width: value.max_width,
            max_height: value.max_height,
            safety: value.safety,
        }
    }
}

impl Configuration {
    pub(crate) fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(config_file) = config_file {
            builder = builder.add_source(config::File::new(
                config_file
                    .to_str()
                    .with_context(|| format!("invalid configuration file path {config_file:?}"))?,
                FileFormat::Toml,
            ));
        }

        Self::build(builder)
    }

    #[cfg(test)]
    pub(crate) fn from_toml(toml: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(config::File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(
                Environment::with_prefix("IWALLPAPERS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings
            .try_deserialize::<Configuration>()
            .context("failed to parse configuration")
    }

    pub(crate) fn telegram(&self) -> Result<Telegram> {
        self.telegram
            .as_ref()
            .context("the [telegram] section is missing")?
            .try_into()
    }

    pub(crate) fn database(&self) -> &DatabaseConfiguration {
        &self.database
    }

    pub(crate) fn broadcast(&self) -> Broadcast {
        (&self.broadcast).into()
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::time::Duration;

    use test_log::test;

    use crate::config::{Backend, Broadcast, Configuration, Telegram};
    use crate::model::Safety;

    const NEEDLE: &str = "0x23acab";
    const REDACTED: &str = "[REDACTED]";

    fn parse(toml: &str) -> Configuration {
        Configuration::from_toml(toml).expect("configuration parses")
    }

    #[test]
    fn telegram_debug() {
        let telegram = Telegram {
            token: NEEDLE.to_string(),
            api_url: String::new(),
            proxy: None,
            poll_timeout: Duration::from_secs(1),
        };

        assert!(format!("{telegram:?}").contains(REDACTED));
        assert!(!format!("{telegram:?}").contains(NEEDLE));
    }

    #[test]
    fn defaults() {
        let configuration = parse(
            r#"
            [telegram]
            tokenFile = "/nonexistent"
            "#,
        );

        assert_eq!(configuration.database().backend(), Backend::Sqlite);
        assert_eq!(configuration.database().url(), "iwallpapers.db");
        assert_eq!(configuration.broadcast(), Broadcast::default());

        let broadcast = configuration.broadcast();
        assert_eq!(broadcast.cooldown, Duration::from_secs(300));
        assert_eq!(broadcast.fan_out, 3);
        assert_eq!(broadcast.attempts, 3);
        assert_eq!(broadcast.max_size, 5 * 1024 * 1024);
    }

    #[test]
    fn overrides() {
        let configuration = parse(
            r#"
            [telegram]
            tokenFile = "/nonexistent"

            [database]
            backend = "postgres"
            url = "postgres://localhost/wallpapers"

            [broadcast]
            fanOut = 0
            cooldown = 1
            safety = "safe"
            "#,
        );

        assert_eq!(configuration.database().backend(), Backend::Postgres);
        let broadcast = configuration.broadcast();
        assert_eq!(broadcast.fan_out, 1);
        assert_eq!(broadcast.cooldown, Duration::from_secs(1));
        assert_eq!(broadcast.cycle_interval, Duration::from_secs(60));
        assert_eq!(broadcast.safety, Safety::Safe);
    }

    #[test]
    fn token_is_read_and_trimmed() {
        let mut file = tempfile::NamedTempFile::new().expect("temporary file");
        writeln!(file, "{NEEDLE}").expect("token written");

        let configuration = parse(&format!(
            "[telegram]\ntokenFile = {:?}\napiUrl = \"http://localhost:8081/\"\n",
            file.path()
        ));
        let telegram = configuration.telegram().expect("token is readable");

        assert_eq!(telegram.token(), NEEDLE);
        assert_eq!(telegram.api_url(), "http://localhost:8081");
    }

    #[test]
    fn missing_token_file() {
        let configuration = parse(
            r#"
            [telegram]
            tokenFile = "/nonexistent/token"
            "#,
        );

        assert!(configuration.telegram().is_err());
    }

    #[test]
    fn telegram_is_optional() {
        let configuration = parse(
            r#"
            [database]
            url = "/var/lib/iwallpapers/wallpapers.db"
            "#,
        );

        assert_eq!(configuration.database().url(), "/var/lib/iwallpapers/wallpapers.db");
        assert!(configuration.telegram().is_err());
    }
}
