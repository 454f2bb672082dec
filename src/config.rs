use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// When responses use chunked transfer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chunking {
    /// Stream when the application did not declare a `Content-Length`.
    #[default]
    Auto,
    /// Always stream HTTP/1.1 responses.
    Always,
    /// Never stream; every body is buffered and sent with its length,
    /// whatever its size.
    Never,
}

impl FromStr for Chunking {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Chunking::Auto),
            "always" => Ok(Chunking::Always),
            "never" => Ok(Chunking::Never),
            other => anyhow::bail!("unknown chunking mode: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Value of the `Server` response header; omitted when `None`.
    pub server_name: Option<String>,
    /// 0 disables the idle timer.
    pub idle_timeout_secs: u64,
    /// Upper bound on a body buffered before its headers are sent. 0 means
    /// unbounded. Ignored under [`Chunking::Never`].
    pub max_buffered_bytes: u64,
    pub chunking: Chunking,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            server_name: Some("courier".to_string()),
            idle_timeout_secs: 60,
            max_buffered_bytes: 1024 * 1024,
            chunking: Chunking::Auto,
        }
    }
}

impl Config {
    /// Builds the configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.listen_addr = addr;
        }
        if let Ok(name) = std::env::var("SERVER_NAME") {
            cfg.server_name = (!name.is_empty()).then_some(name);
        }
        if let Some(secs) = env_parse("IDLE_TIMEOUT_SECS") {
            cfg.idle_timeout_secs = secs;
        }
        if let Some(limit) = env_parse("MAX_BUFFERED_BYTES") {
            cfg.max_buffered_bytes = limit;
        }
        if let Some(chunking) = env_parse("CHUNKING") {
            cfg.chunking = chunking;
        }

        cfg
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    /// `None` when `idle_timeout_secs` is 0, which disables the idle timer.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn buffer_limit(&self) -> Option<u64> {
        (self.max_buffered_bytes > 0).then_some(self.max_buffered_bytes)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}
