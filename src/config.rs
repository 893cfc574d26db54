//! Shell configuration: defaults, CLI flags, and an optional YAML overlay.
//!
//! Mirrors the teacher's split between a `clap`-derived args struct and a
//! validated runtime config (`MqtliArgs` merged over `MqtliConfig` in
//! `mqtlib::config::mqtli_config`): `ShellArgs` is what the binary parses
//! from the command line and an optional `--config` file; `ShellConfig` is
//! what the rest of the crate actually depends on. Values are consumed only
//! at construction — changing them at runtime requires a restart.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use derive_getters::Getters;
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::transport::BrokerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file \"{1}\"")]
    FileNotReadable(#[source] std::io::Error, PathBuf),
    #[error("could not parse config file \"{1}\"")]
    FileNotParseable(#[source] serde_yaml::Error, PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Command-line surface, parsed with `clap`'s derive API.
#[derive(Parser, Debug)]
#[command(name = "mqsh", about = "Interactive MQTT debug shell")]
pub struct ShellArgs {
    #[arg(long, env = "MQSH_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "MQSH_PORT", default_value_t = 1883)]
    pub port: u16,

    #[arg(long, env = "MQSH_CLIENT_ID", default_value = "mqsh")]
    pub client_id: String,

    #[arg(long, env = "MQSH_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "MQSH_PASSWORD")]
    pub password: Option<String>,

    #[arg(long, env = "MQSH_USE_TLS", default_value_t = false)]
    pub use_tls: bool,

    #[arg(long, env = "MQSH_TLS_CA_FILE")]
    pub tls_ca_file: Option<PathBuf>,

    /// Optional YAML file overlaying these defaults (see [`ShellConfigFile`]).
    #[arg(long, env = "MQSH_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "MQSH_SUBSCRIBE")]
    pub subscribe: Vec<String>,

    #[arg(long, env = "MQSH_SINGLE_THREADED", default_value_t = false)]
    pub single_threaded: bool,
}

/// The subset of [`ShellConfig`] an operator may override from a YAML file,
/// the same `serde_yaml`-deserialized-then-merged shape as the teacher's
/// on-disk config.
#[derive(Debug, Default, Deserialize)]
pub struct ShellConfigFile {
    pub prompt: Option<String>,
    pub channel_buffer_size: Option<usize>,
    pub message_history_limit: Option<usize>,
    pub rate_window_seconds: Option<i64>,
    pub latency_window_size: Option<usize>,
    pub top_topics_limit: Option<usize>,
    pub topic_truncation_threshold: Option<usize>,
    pub aliases: Option<HashMap<String, String>>,
}

impl ShellConfigFile {
    pub fn load(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotReadable(e, path.clone()))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::FileNotParseable(e, path.clone()))
    }
}

/// Runtime configuration actually consumed by the shell core, handlers, and
/// supporting data structures. Constructed once at startup.
#[derive(Clone, Debug, Getters, Validate)]
pub struct ShellConfig {
    #[validate(length(min = 1))]
    prompt: String,
    #[validate(range(min = 1))]
    channel_buffer_size: usize,
    #[validate(range(min = 1))]
    message_history_limit: usize,
    #[validate(range(min = 1))]
    rate_window_seconds: i64,
    #[validate(range(min = 1))]
    latency_window_size: usize,
    #[validate(range(min = 1))]
    top_topics_limit: usize,
    #[validate(range(min = 1))]
    topic_truncation_threshold: usize,
    aliases: HashMap<String, String>,
    single_threaded: bool,
    initial_subscriptions: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "mqsh> ".to_string(),
            channel_buffer_size: 256,
            message_history_limit: 1000,
            rate_window_seconds: 10,
            latency_window_size: 100,
            top_topics_limit: 10,
            topic_truncation_threshold: 128,
            aliases: default_aliases(),
            single_threaded: false,
            initial_subscriptions: Vec::new(),
        }
    }
}

impl ShellConfig {
    /// Merges an optional on-disk overlay over the built-in defaults, then
    /// validates. Values are consumed only here — nothing in the shell
    /// re-reads the file after construction.
    pub fn from_file(overlay: Option<ShellConfigFile>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(overlay) = overlay {
            if let Some(prompt) = overlay.prompt {
                config.prompt = prompt;
            }
            if let Some(v) = overlay.channel_buffer_size {
                config.channel_buffer_size = v;
            }
            if let Some(v) = overlay.message_history_limit {
                config.message_history_limit = v;
            }
            if let Some(v) = overlay.rate_window_seconds {
                config.rate_window_seconds = v;
            }
            if let Some(v) = overlay.latency_window_size {
                config.latency_window_size = v;
            }
            if let Some(v) = overlay.top_topics_limit {
                config.top_topics_limit = v;
            }
            if let Some(v) = overlay.topic_truncation_threshold {
                config.topic_truncation_threshold = v;
            }
            if let Some(aliases) = overlay.aliases {
                config.aliases.extend(aliases);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_single_threaded(mut self, single_threaded: bool) -> Self {
        self.single_threaded = single_threaded;
        self
    }

    pub fn with_initial_subscriptions(mut self, subs: Vec<String>) -> Self {
        self.initial_subscriptions = subs;
        self
    }
}

impl From<&ShellArgs> for BrokerConfig {
    fn from(args: &ShellArgs) -> Self {
        BrokerConfig {
            host: args.host.clone(),
            port: args.port,
            client_id: args.client_id.clone(),
            keep_alive: std::time::Duration::from_secs(30),
            username: args.username.clone(),
            password: args.password.clone(),
            use_tls: args.use_tls,
            tls_ca_file: args.tls_ca_file.clone(),
        }
    }
}

/// The default alias table (§4.9): short forms, monitoring, history, MQTT
/// ops, step, visualization, content-filter shorthand. Users may add more
/// via `ShellConfigFile::aliases`.
fn default_aliases() -> HashMap<String, String> {
    HashMap::from([
        ("q".to_string(), "exit".to_string()),
        ("?".to_string(), "help".to_string()),
        ("f".to_string(), "filter".to_string()),
        ("p".to_string(), "pause".to_string()),
        ("r".to_string(), "resume".to_string()),
        ("s".to_string(), "stats".to_string()),
        ("c".to_string(), "filter clear".to_string()),
        ("h".to_string(), "history".to_string()),
        ("l".to_string(), "last".to_string()),
        ("pub".to_string(), "publish".to_string()),
        ("sub".to_string(), "subscribe".to_string()),
        ("unsub".to_string(), "unsubscribe".to_string()),
        ("n".to_string(), "next".to_string()),
        ("viz".to_string(), "visualize".to_string()),
        ("g".to_string(), "filter grep ".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ShellConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlay_replaces_only_given_fields() {
        let overlay = ShellConfigFile {
            prompt: Some("dbg> ".to_string()),
            message_history_limit: Some(50),
            ..Default::default()
        };
        let config = ShellConfig::from_file(Some(overlay)).unwrap();
        assert_eq!(config.prompt(), "dbg> ");
        assert_eq!(*config.message_history_limit(), 50);
        assert_eq!(*config.channel_buffer_size(), 256);
    }

    #[test]
    fn default_aliases_include_q_for_exit() {
        let config = ShellConfig::default();
        assert_eq!(config.aliases().get("q"), Some(&"exit".to_string()));
    }
}
