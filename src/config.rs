use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{warn, LevelFilter};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "emotion-bridge", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long, default_value = "./config.toml")]
    pub config: PathBuf,

    /// Override serial device path
    #[clap(long)]
    pub serial_port: Option<String>,

    /// Override serial baud rate
    #[clap(long)]
    pub baud_rate: Option<u32>,

    /// Override HTTP listen port
    #[clap(long)]
    pub port: Option<u16>,

    /// Override log level (error, warn, info, debug, trace)
    #[clap(long)]
    pub log_level: Option<LevelFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LevelFilter,
    pub server: ServerConfig,
    pub serial: SerialConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Static front-end page served at `/`
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_seconds: f64,
    /// Set from `read_timeout_seconds` once it passes validation
    #[serde(skip)]
    read_timeout: Duration,
    /// Marker the firmware prints before each JSON payload
    pub line_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub vision_model: String,
    pub speech_model: String,
    pub voice: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            server: ServerConfig::default(),
            serial: SerialConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            index_path: PathBuf::from("templates/index.html"),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/cu.usbserial-0001".to_string(),
            baud_rate: 115200,
            read_timeout_seconds: 1.0,
            read_timeout: Duration::from_secs(1),
            line_prefix: "ESP32 → ".to_string(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            speech_model: "gpt-4o-mini-tts".to_string(),
            voice: "shimmer".to_string(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        let config_content = fs::read_to_string(&cli.config)
            .with_context(|| format!("Failed to read config file: {:?}", cli.config))?;
        parse_config(&config_content)?
    } else {
        warn!("Config file {:?} not found, using defaults", cli.config);
        Config::default()
    };

    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        if !api_key.is_empty() {
            config.openai.api_key = api_key;
        }
    }

    // Apply CLI overrides
    if let Some(ref serial_port) = cli.serial_port {
        config.serial.port = serial_port.clone();
    }

    if let Some(baud_rate) = cli.baud_rate {
        config.serial.baud_rate = baud_rate;
    }

    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    validate(&mut config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config file")
}

fn validate(config: &mut Config) -> Result<()> {
    let seconds = config.serial.read_timeout_seconds;
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("serial.read_timeout_seconds must be positive, got {}", seconds);
    }
    config.serial.read_timeout = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("serial.read_timeout_seconds out of range: {}", seconds))?;
    Ok(())
}
