use crate::prelude::*;

use serde::Deserialize;
use std::str::FromStr;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub inverters: Vec<Inverter>,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    pub scheduler: Option<Scheduler>,
}

// Inverter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    pub port: u16,

    #[serde(default, deserialize_with = "de_serial")]
    pub serial: Option<Serial>,
    #[serde(default, deserialize_with = "de_serial")]
    pub datalog: Option<Serial>,

    pub protocol: Option<u16>,
    pub read_timeout: Option<u64>,
    pub use_tcp_nodelay: Option<bool>,
    pub register_block_size: Option<u16>,
}

impl Inverter {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Configured inverter serial, or the all-zero unaddressed sentinel.
    pub fn serial(&self) -> Serial {
        self.serial.unwrap_or_else(Serial::unaddressed)
    }

    /// Configured datalog serial, or the all-0xFF broadcast sentinel.
    pub fn datalog(&self) -> Serial {
        self.datalog.unwrap_or_else(Serial::broadcast)
    }

    pub fn protocol(&self) -> u16 {
        self.protocol.unwrap_or(1)
    }

    pub fn read_timeout(&self) -> u64 {
        self.read_timeout.unwrap_or(900) // 15 minutes
    }

    pub fn use_tcp_nodelay(&self) -> bool {
        self.use_tcp_nodelay.unwrap_or(true)
    }

    pub fn register_block_size(&self) -> u16 {
        self.register_block_size.unwrap_or(40)
    }
} // }}}

// Scheduler {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Scheduler {
    pub poll_interval_ms: Option<u64>,
}
// }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn enabled_inverters(&self) -> Vec<Inverter> {
        self.inverters
            .iter()
            .filter(|inverter| inverter.enabled())
            .cloned()
            .collect()
    }

    pub fn loglevel(&self) -> String {
        self.loglevel.clone()
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.scheduler
            .as_ref()
            .and_then(|scheduler| scheduler.poll_interval_ms)
            .unwrap_or(5000)
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_enabled() -> bool {
        true
    }
}

fn de_serial<'de, D>(deserializer: D) -> Result<Option<Serial>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| Serial::from_str(&s).map_err(serde::de::Error::custom))
        .transpose()
}
