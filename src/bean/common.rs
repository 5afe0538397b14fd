//! Shared field groups and serde helpers for protocol beans.

use serde::{Deserialize, Serialize};

use crate::option_util::NoneOrSome;

pub fn default_true() -> bool {
    true
}

pub fn is_false(value: &bool) -> bool {
    !*value
}

pub fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// TLS parameters shared by the engine-outbound protocol family.
///
/// `certificates` holds inline PEM text; when present it is written to a
/// side file at compile time for workers that only accept file paths.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TlsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "NoneOrSome::is_empty", alias = "alpn_protocol")]
    pub alpn: NoneOrSome<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<String>,
    #[serde(default, skip_serializing_if = "NoneOrSome::is_empty")]
    pub pinned_peer_certificate_chain_sha256: NoneOrSome<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utls_fingerprint: Option<String>,
}

/// Stream transport for the engine-outbound protocol family.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamTransport {
    #[default]
    Tcp,
    #[serde(alias = "websocket")]
    Ws {
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "is_zero")]
        max_early_data: u32,
    },
    Grpc {
        service_name: String,
    },
    HttpUpgrade {
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        path: Option<String>,
    },
}

impl StreamTransport {
    pub fn network(&self) -> &'static str {
        match self {
            StreamTransport::Tcp => "tcp",
            StreamTransport::Ws { .. } => "ws",
            StreamTransport::Grpc { .. } => "grpc",
            StreamTransport::HttpUpgrade { .. } => "httpupgrade",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_settings_defaults() {
        let tls: TlsSettings = serde_yaml::from_str("{}").unwrap();
        assert!(tls.sni.is_none());
        assert!(!tls.allow_insecure);
        assert!(tls.alpn.is_empty());
    }

    #[test]
    fn test_tls_alpn_accepts_single_or_list() {
        let tls: TlsSettings = serde_yaml::from_str("alpn: h3").unwrap();
        assert_eq!(tls.alpn.len(), 1);
        let tls: TlsSettings = serde_yaml::from_str("alpn: [h2, h3]").unwrap();
        assert_eq!(tls.alpn.len(), 2);
    }

    #[test]
    fn test_transport_default_is_tcp() {
        assert_eq!(StreamTransport::default().network(), "tcp");
    }

    #[test]
    fn test_transport_ws() {
        let t: StreamTransport = serde_yaml::from_str("type: ws\npath: /tunnel").unwrap();
        assert_eq!(t.network(), "ws");
    }
}
