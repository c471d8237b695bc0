//! Settings types.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a partial file only needs the keys it changes.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Root settings for the chatwire binary.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatwireSettings {
    pub gateway: GatewaySettings,
    pub orchestrator: OrchestratorSettings,
    pub logging: LoggingSettings,
}

/// Where and how to reach the chat-completions gateway.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    pub base_url: String,
    /// Bearer token. Never serialized back out.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    /// Session cookie used when no API key is configured.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub credential_cookie: Option<SecretString>,
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_string(),
            api_key: None,
            credential_cookie: None,
            connect_timeout_ms: 30_000,
            idle_timeout_ms: 90_000,
        }
    }
}

impl GatewaySettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    /// Upper bound on request/tool round trips per turn.
    pub max_iterations: u32,
    /// Minimum gap between store writes while streaming.
    pub flush_interval_ms: u64,
    pub tool_timeout_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            flush_interval_ms: 100,
            tool_timeout_ms: 120_000,
        }
    }
}

impl OrchestratorSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Empty strings count as unset.
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}
