use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_DATA_FILE: &str = "webplayer-data.json";

#[derive(Parser, Debug, Default)]
#[command(name = "webplayer")]
#[command(about = "Serves the webplayer playlist manager", long_about = None)]
pub struct Cli {
    /// HTTP server port
    #[arg(short = 'p', long = "port", env = "WEBPLAYER_PORT")]
    pub port: Option<u16>,

    /// Path to data persistence file
    #[arg(short = 'd', long = "data", env = "WEBPLAYER_DATA")]
    pub data: Option<PathBuf>,

    /// Optional YAML config file
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct App {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_data")]
    data: PathBuf,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_data() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

impl Default for App {
    fn default() -> Self {
        App {
            port: default_port(),
            data: default_data(),
        }
    }
}

impl App {
    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_data(&self) -> &Path {
        &self.data
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
}

impl Config {
    /// Builds the effective config: flags and env vars win over the file,
    /// the file wins over built-in defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let cfg = match &cli.config_path {
            Some(path) => Config::new(path)?,
            None => Config::default(),
        };
        Ok(cfg.with_overrides(cli))
    }

    pub fn new(path: &Path) -> Result<Self> {
        let yaml_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Config::parse(&yaml_str)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn parse(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str);
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.app.port = port;
        }
        if let Some(data) = &cli.data {
            self.app.data = data.clone();
        }
        self
    }

    /// Expands `${VAR}` and `${VAR:-default}` references.
    fn substitute_env_vars(yaml_str: &str) -> String {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            let Some(end) = result[actual_start..].find('}') else {
                break;
            };
            let var_name = &result[actual_start + 2..actual_start + end];

            let env_value = match var_name.split_once(":-") {
                Some((actual_var, default_val)) => {
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                }
                None => env::var(var_name).unwrap_or_else(|_| {
                    tracing::warn!(var = var_name, "environment variable not found");
                    String::new()
                }),
            };

            result.replace_range(actual_start..actual_start + end + 1, &env_value);
            offset = actual_start + env_value.len();
        }

        result
    }
}
