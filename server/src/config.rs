use anyhow::Context;
use sandcore::device::SyntheticConfig;
use sandcore::prelude::DEFAULT_IMAGE_QUALITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub image_quality: u8,
    pub stream_interval_ms: u64,
    pub led_sleep_ms: u64,
    pub camera: SyntheticConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4777,
            image_quality: DEFAULT_IMAGE_QUALITY,
            stream_interval_ms: 200,
            led_sleep_ms: 200,
            camera: SyntheticConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading server config {}", path_ref.display()))?;
        let config: ServerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing server config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid bind host {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms.max(1))
    }

    pub fn led_sleep(&self) -> Duration {
        Duration::from_millis(self.led_sleep_ms)
    }
}
