//! Hysteria v1 and v2 beans.
//!
//! Both carry a `ports` spec string that may name a single port, a list,
//! or ranges for port hopping. The spec is kept as text here and only
//! validated/parsed at compile time, so an invalid spec fails the session
//! before any side file is written. A hopping spec is incompatible with
//! chaining: a chained hop always dials one resolved port.

use serde::{Deserialize, Serialize};

use super::common::{default_true, is_false, is_zero};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HysteriaProtocol {
    #[default]
    Udp,
    Faketcp,
    WechatVideo,
}

/// Hysteria v1 auth payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum HysteriaAuth {
    Base64(String),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HysteriaBean {
    pub server: String,
    /// Port spec: "443", "443,8443", "2000-3000", or mixes.
    pub ports: String,
    #[serde(default)]
    pub protocol: HysteriaProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HysteriaAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub up_mbps: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub down_mbps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    /// Inline CA PEM text, written to a side file at compile time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_insecure: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub recv_window_conn: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub recv_window: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_mtu_discovery: bool,
    #[serde(default = "default_hop_interval")]
    pub hop_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Hysteria2Bean {
    pub server: String,
    /// Port spec: "443", "443,8443", "2000-3000", or mixes.
    pub ports: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Salamander obfuscation password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "pinSHA256")]
    pub pin_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub up_mbps: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub down_mbps: u32,
    #[serde(default = "default_hop_interval")]
    pub hop_interval: u32,
    /// Whether port hopping may be used at all; a multi-port spec with
    /// hopping disabled pins one dialed port instead.
    #[serde(default = "default_true")]
    pub port_hopping: bool,
}

fn default_hop_interval() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteria2_defaults() {
        let bean: Hysteria2Bean =
            serde_yaml::from_str("server: example.com\nports: \"443\"").unwrap();
        assert_eq!(bean.hop_interval, 10);
        assert!(bean.port_hopping);
        assert!(bean.auth.is_none());
    }

    #[test]
    fn test_hysteria_auth_forms() {
        let auth: HysteriaAuth =
            serde_yaml::from_str("type: string\npayload: hunter2").unwrap();
        assert_eq!(auth, HysteriaAuth::String("hunter2".to_string()));
    }
}
