use serde::{Deserialize, Serialize};

use crate::option_util::NoneOrSome;

fn default_mtu() -> u32 {
    1420
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WireGuardBean {
    pub server: String,
    pub port: u16,
    /// Local tunnel addresses (e.g. "10.0.0.2/32").
    pub local_address: NoneOrSome<String>,
    pub private_key: String,
    pub peer_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_pre_shared_key: Option<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    /// Three reserved bytes, e.g. [1, 2, 3]; used by some providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<[u8; 3]>,
}
