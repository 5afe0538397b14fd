use serde::{Deserialize, Serialize};

use super::common::{default_true, is_false};

fn default_congestion() -> String {
    "cubic".to_string()
}

fn default_udp_relay_mode() -> String {
    "native".to_string()
}

fn default_mtu() -> u32 {
    1500
}

/// TUIC v4 (token auth).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TuicBean {
    pub server: String,
    pub port: u16,
    pub token: String,
    #[serde(default = "default_udp_relay_mode")]
    pub udp_relay_mode: String,
    #[serde(default = "default_congestion")]
    pub congestion_controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_sni: bool,
    #[serde(default = "default_true")]
    pub reduce_rtt: bool,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
}

/// TUIC v5 (uuid + password auth).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tuic5Bean {
    pub server: String,
    pub port: u16,
    pub uuid: String,
    pub password: String,
    #[serde(default = "default_udp_relay_mode")]
    pub udp_relay_mode: String,
    #[serde(default = "default_congestion")]
    pub congestion_control: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_sni: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub zero_rtt_handshake: bool,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
}
