use serde::{Deserialize, Serialize};

use super::common::is_false;

/// Optional shadowsocks layer inside a trojan-go tunnel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrojanGoShadowsocks {
    pub method: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrojanGoBean {
    pub server: String,
    pub port: u16,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_insecure: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub websocket: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadowsocks: Option<TrojanGoShadowsocks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utls_fingerprint: Option<String>,
}
