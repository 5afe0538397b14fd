use serde::{Deserialize, Serialize};

use super::common::default_true;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShadowTlsBean {
    pub server: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    /// Protocol v3 (strict mode).
    #[serde(default = "default_true")]
    pub v3: bool,
}
