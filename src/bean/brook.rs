use serde::{Deserialize, Serialize};

use super::common::is_false;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrookProtocol {
    #[default]
    Tcp,
    Ws,
    Wss,
    Quic,
}

impl BrookProtocol {
    /// Worker subcommand for this transport.
    pub fn client_subcommand(&self) -> &'static str {
        match self {
            BrookProtocol::Tcp => "client",
            BrookProtocol::Ws => "wsclient",
            BrookProtocol::Wss => "wssclient",
            BrookProtocol::Quic => "quicclient",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrookBean {
    pub server: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: BrookProtocol,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure: bool,
}
