use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line flags.
///
/// Every field is optional so that only flags the user actually passed end
/// up in the CLI layer; anything left out falls through to env, TOML and
/// the built-in defaults.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "gateway-server", version, about = "Real-time chat gateway")]
pub struct Cli {
    /// Port to listen on [default: 3000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./gateway.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// HS256 secret shared with the service that issues session tokens
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,

    /// Announce online/offline status to a user's servers on connect/disconnect [default: true]
    #[arg(long, action = clap::ArgAction::Set)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_enabled: Option<bool>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// Path to TOML config file
    pub config: String,

    /// Enable structured JSON logging
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    pub generate_config: bool,

    /// HS256 secret shared with the service that issues session tokens
    pub session_secret: String,

    /// Announce online/offline status to a user's servers on connect/disconnect
    pub presence_enabled: bool,

    /// Connection and fan-out tuning (loaded from [gateway] section in TOML)
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Tuning for connections and the topic index.
///
/// None of these values are load-bearing for correctness: any bounded
/// heartbeat deadline works, and the bucket count only shapes lock contention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Interval at which clients are expected to send a heartbeat (default: 10)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Extra time allowed past the interval before the connection is dropped (default: 15)
    #[serde(default = "default_heartbeat_grace")]
    pub heartbeat_grace_secs: u64,

    /// Number of independently locked subscription buckets (default: 16)
    #[serde(default = "default_topic_buckets")]
    pub topic_buckets: usize,

    /// Outbound frames buffered per connection before sends start failing (default: 256)
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    /// Largest inflated inbound frame accepted from a client, in bytes (default: 65536)
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl GatewayConfig {
    /// Time a connection stays alive after open or its last heartbeat.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs + self.heartbeat_grace_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_grace_secs: default_heartbeat_grace(),
            topic_buckets: default_topic_buckets(),
            send_queue_capacity: default_send_queue_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_heartbeat_grace() -> u64 {
    15
}

fn default_topic_buckets() -> usize {
    16
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./gateway.toml".to_string(),
            json_logs: false,
            generate_config: false,
            session_secret: String::new(),
            presence_enabled: true,
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (GATEWAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Cli::parse())
    }

    /// Resolve all layers for already-parsed CLI flags.
    pub fn load_from(cli: Cli) -> Result<Self, figment::Error> {
        Self::figment(&cli.config)
            .merge(Serialized::defaults(cli))
            .extract()
    }

    /// Defaults, file and environment layers, without CLI args.
    fn figment(config_path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("GATEWAY_").split("__"))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Gateway Server Configuration
# Place this file at ./gateway.toml or specify with --config <path>
# All settings can be overridden via environment variables (GATEWAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# HS256 secret used to validate session tokens presented on /ws
# session_secret = ""

# Publish online/offline status to the user's servers on connect/disconnect
# presence_enabled = true

# ---- Connections and fan-out ----
# [gateway]

# Clients send a heartbeat every interval; the connection is dropped once
# interval + grace elapses without one.
# heartbeat_interval_secs = 10
# heartbeat_grace_secs = 15

# Number of independently locked subscription buckets
# topic_buckets = 16

# Outbound frames buffered per connection; sends to a full queue are dropped
# send_queue_capacity = 256

# Largest inflated inbound frame accepted from a client (bytes)
# max_frame_bytes = 65536
"#
    .to_string()
}
