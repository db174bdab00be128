use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::monitor::calibration::Calibration;
use crate::monitor::schedule::PollIntervals;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Used when a device record carries no app server URL of its own
    #[serde(default = "default_app_server_url")]
    pub app_server_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_app_server_url() -> String {
    "https://wap.tplinkcloud.com/".into()
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            app_server_url: default_app_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Start polling every known device at boot
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    /// Abort a pending `finished` notification when a new brew starts before it fires
    #[serde(default)]
    pub cancel_stale_finished: bool,
    #[serde(default)]
    pub poll_intervals: PollIntervals,
    /// Calibration given to devices seen for the first time
    #[serde(default)]
    pub calibration: Calibration,
}

fn default_autostart() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            autostart: default_autostart(),
            cancel_stale_finished: false,
            poll_intervals: PollIntervals::default(),
            calibration: Calibration::default(),
        }
    }
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    /// Afterwards, if DATABASE_URL env is set, override `database.url`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, anyhow::Error> {
        let expanded = expand_env_placeholders(raw)?;
        let mut cfg: Self = serde_yaml::from_str(&expanded)?;

        // Optional: allow DATABASE_URL env to override whatever YAML had
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(!self.database.url.is_empty(), "database.url cannot be empty");
        anyhow::ensure!(
            self.cloud.request_timeout_secs > 0,
            "cloud.request_timeout_secs must be positive"
        );

        let intervals = &self.monitor.poll_intervals;
        anyhow::ensure!(
            intervals.default_ms > 0 && intervals.offline_ms > 0 && intervals.error_ms > 0,
            "monitor.poll_intervals must all be positive"
        );

        self.monitor
            .calibration
            .validate()
            .map_err(|msg| anyhow::anyhow!("monitor.calibration: {}", msg))?;

        Ok(())
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
/// "$$" becomes a literal "$".
fn expand_env_placeholders(input: &str) -> Result<String, anyhow::Error> {
    use anyhow::Context;

    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let close = match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };

        it.next(); // consume the opening delimiter
        let var = read_until(&mut it, close)
            .with_context(|| format!("unterminated env placeholder: missing '{}'", close))?;
        let val = std::env::var(&var)
            .with_context(|| format!("missing environment variable: {}", var))?;
        out.push_str(&val);
    }

    Ok(out)
}

/// Read characters until we hit `end`, consuming the closing delimiter.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
