use std::fs::read_to_string;
use std::net::SocketAddr;
use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;
use session::jitter::JitterBufferConfig;
use session::ports::PortRange;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            other => return Err(anyhow::anyhow!("unknown log level: {other}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

impl Default for Log {
    fn default() -> Self {
        Self { level: LogLevel::default() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JitterSettings {
    #[serde(default = "JitterSettings::default_samples_per_second")]
    pub samples_per_second: u32,
    #[serde(default = "JitterSettings::default_samples_per_packet")]
    pub samples_per_packet: u32,
    #[serde(default = "JitterSettings::default_initial_qlen")]
    pub initial_qlen: usize,
    #[serde(default = "JitterSettings::default_max_qlen")]
    pub max_qlen: usize,
    /// `0` disables the drift bound entirely.
    #[serde(default)]
    pub max_drift_ms: u32,
}

impl JitterSettings {
    fn default_samples_per_second() -> u32 {
        8000
    }

    fn default_samples_per_packet() -> u32 {
        160
    }

    fn default_initial_qlen() -> usize {
        10
    }

    fn default_max_qlen() -> usize {
        300
    }

    pub fn to_jitter_buffer_config(self) -> JitterBufferConfig {
        JitterBufferConfig {
            samples_per_second: self.samples_per_second,
            samples_per_packet: self.samples_per_packet,
            initial_qlen: self.initial_qlen,
            max_qlen: self.max_qlen,
            max_drift_ms: self.max_drift_ms,
        }
    }
}

impl Default for JitterSettings {
    fn default() -> Self {
        Self {
            samples_per_second: Self::default_samples_per_second(),
            samples_per_packet: Self::default_samples_per_packet(),
            initial_qlen: Self::default_initial_qlen(),
            max_qlen: Self::default_max_qlen(),
            max_drift_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortRangeSettings {
    #[serde(default = "PortRangeSettings::default_start")]
    pub start: u16,
    #[serde(default = "PortRangeSettings::default_end")]
    pub end: u16,
}

impl PortRangeSettings {
    fn default_start() -> u16 {
        16384
    }

    fn default_end() -> u16 {
        32768
    }

    pub fn to_port_range(self) -> PortRange {
        PortRange { start: self.start, end: self.end }
    }
}

impl Default for PortRangeSettings {
    fn default() -> Self {
        Self { start: Self::default_start(), end: Self::default_end() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SrtpSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Hex-encoded master key; ignored unless `enabled` is set.
    #[serde(default)]
    pub master_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Session {
    pub listen: SocketAddr,
    #[serde(default)]
    pub jitter: JitterSettings,
    #[serde(default)]
    pub port_range: PortRangeSettings,
    #[serde(default)]
    pub srtp: SrtpSettings,
    #[serde(default = "Session::default_event_payload_type")]
    pub event_payload_type: u8,
    #[serde(default = "Session::default_participant_timeout_secs")]
    pub participant_timeout_secs: u64,
}

impl Session {
    fn default_event_payload_type() -> u8 {
        101
    }

    fn default_participant_timeout_secs() -> u64 {
        25
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub session: Session,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about,
    version,
    long_about = "An RTP/RTCP media session toolkit: adaptive jitter buffer, RFC 2833 DTMF and RTCP bookkeeping."
)]
pub struct Cli {
    /// Path to a json5 config file.
    ///
    /// Example: rtpcore --config /etc/rtpcore/config.json5
    #[arg(long)]
    pub config: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(serde_json5::from_str::<Self>(&read_to_string(
            &Cli::parse().config,
        )?)?)
    }
}
