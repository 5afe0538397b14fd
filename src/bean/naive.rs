use serde::{Deserialize, Serialize};

use super::common::{is_false, is_zero};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NaiveProto {
    #[default]
    Https,
    Quic,
}

impl NaiveProto {
    pub fn as_str(&self) -> &'static str {
        match self {
            NaiveProto::Https => "https",
            NaiveProto::Quic => "quic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NaiveBean {
    pub server: String,
    pub port: u16,
    #[serde(default)]
    pub proto: NaiveProto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    /// Newline-separated extra request headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub insecure_concurrency: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_post_quantum: bool,
}
