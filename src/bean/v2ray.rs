//! Beans for protocols natively understood by the tunneling engine's
//! outbound layer.

use serde::{Deserialize, Serialize};

use super::common::{StreamTransport, TlsSettings, is_zero};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketEncoding {
    #[default]
    None,
    Packet,
    Xudp,
}

impl PacketEncoding {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            PacketEncoding::None => None,
            PacketEncoding::Packet => Some("packet"),
            PacketEncoding::Xudp => Some("xudp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VmessBean {
    pub server: String,
    pub port: u16,
    #[serde(alias = "uuid")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub alter_id: u32,
    /// Cipher name; "auto" when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    #[serde(default)]
    pub packet_encoding: PacketEncoding,
    #[serde(default)]
    pub transport: StreamTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VlessBean {
    pub server: String,
    pub port: u16,
    #[serde(alias = "uuid")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(default)]
    pub packet_encoding: PacketEncoding,
    #[serde(default)]
    pub transport: StreamTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrojanBean {
    pub server: String,
    pub port: u16,
    pub password: String,
    #[serde(default)]
    pub transport: StreamTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}
