use serde::{Deserialize, Serialize};

use super::common::is_false;

fn default_congestion() -> String {
    "bbr".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JuicityBean {
    pub server: String,
    pub port: u16,
    pub uuid: String,
    pub password: String,
    #[serde(default = "default_congestion")]
    pub congestion_control: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_certchain_sha256: Option<String>,
}
