use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MieruTransport {
    #[default]
    Tcp,
    Udp,
}

impl MieruTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            MieruTransport::Tcp => "TCP",
            MieruTransport::Udp => "UDP",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MieruMultiplexing {
    Off,
    #[default]
    Low,
    Middle,
    High,
}

impl MieruMultiplexing {
    pub fn as_str(&self) -> &'static str {
        match self {
            MieruMultiplexing::Off => "MULTIPLEXING_OFF",
            MieruMultiplexing::Low => "MULTIPLEXING_LOW",
            MieruMultiplexing::Middle => "MULTIPLEXING_MIDDLE",
            MieruMultiplexing::High => "MULTIPLEXING_HIGH",
        }
    }
}

fn default_mtu() -> u32 {
    1400
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MieruBean {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub transport: MieruTransport,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub multiplexing: MieruMultiplexing,
}
