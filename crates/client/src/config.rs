use std::{str::FromStr, time::Duration};

use murmur_media::MediaConfig;
use murmur_sfu_client::{protocol::AUDIO_BRIDGE_PLUGIN, Capability, ClientOptions};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid gateway url: {0}")]
    InvalidGatewayUrl(String),
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub gateway_url: String,
    pub protocol: String,
    pub plugin: String,
    pub room: Option<u64>,
    pub display: Option<String>,
    pub log_format: LogFormat,
    pub keepalive_interval_secs: u64,
    pub handshake_timeout_secs: u64,
    pub media: MediaConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:8188/".to_string(),
            protocol: "janus-protocol".to_string(),
            plugin: AUDIO_BRIDGE_PLUGIN.to_string(),
            room: None,
            display: None,
            log_format: LogFormat::Compact,
            keepalive_interval_secs: 15,
            handshake_timeout_secs: 30,
            media: MediaConfig::default(),
        }
    }
}

/// Command-line values layered over files and environment.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub gateway_url: Option<String>,
    pub protocol: Option<String>,
    pub plugin: Option<String>,
    pub room: Option<u64>,
    pub display: Option<String>,
    pub log_format: Option<LogFormat>,
    pub keepalive_interval_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub stun_servers: Option<Vec<String>>,
    pub send_audio: Option<bool>,
}

impl ClientConfig {
    const ENV_PREFIX: &'static str = "MURMUR_CLIENT";

    pub fn load() -> Result<Self, ConfigError> {
        let defaults = ClientConfig::default();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/client").required(false))
            .add_source(config::File::with_name("config/client.local").required(false))
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("media.stun_servers")
                    .try_parsing(true),
            )
            .set_default("gateway_url", defaults.gateway_url.clone())?
            .set_default("protocol", defaults.protocol.clone())?
            .set_default("plugin", defaults.plugin.clone())?
            .set_default("log_format", defaults.log_format.as_str())?
            .set_default(
                "keepalive_interval_secs",
                defaults.keepalive_interval_secs as i64,
            )?
            .set_default(
                "handshake_timeout_secs",
                defaults.handshake_timeout_secs as i64,
            )?;

        let settings: ClientConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) -> Result<(), ConfigError> {
        if let Some(url) = &overrides.gateway_url {
            self.gateway_url = url.clone();
        }
        if let Some(protocol) = &overrides.protocol {
            self.protocol = protocol.clone();
        }
        if let Some(plugin) = &overrides.plugin {
            self.plugin = plugin.clone();
        }
        if let Some(room) = overrides.room {
            self.room = Some(room);
        }
        if let Some(display) = &overrides.display {
            self.display = Some(display.clone());
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        if let Some(secs) = overrides.keepalive_interval_secs {
            self.keepalive_interval_secs = secs;
        }
        if let Some(secs) = overrides.handshake_timeout_secs {
            self.handshake_timeout_secs = secs;
        }
        if let Some(servers) = &overrides.stun_servers {
            self.media.stun_servers = servers.clone();
        }
        if let Some(send_audio) = overrides.send_audio {
            self.media.send_audio = send_audio;
        }
        self.validate()
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// `None` when keepalives are disabled.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }

    /// `None` when the handshake may wait indefinitely.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_timeout_secs > 0).then(|| Duration::from_secs(self.handshake_timeout_secs))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            capability: Capability::new(self.plugin.clone()),
            room: self.room,
            display: self.display.clone(),
            send_audio: self.media.send_audio,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.gateway_url.trim();
        let has_host = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
        if !has_host {
            return Err(ConfigError::InvalidGatewayUrl(self.gateway_url.clone()));
        }
        if self.protocol.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "protocol",
                reason: "sub-protocol cannot be empty".into(),
            });
        }
        if self.plugin.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "plugin",
                reason: "plugin name cannot be empty".into(),
            });
        }
        murmur_media::validate_config(&self.media).map_err(|err| ConfigError::InvalidSetting {
            field: "media.stun_servers",
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unsupported log format '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for LogFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        LogFormat::from_str(&value).map_err(D::Error::custom)
    }
}
