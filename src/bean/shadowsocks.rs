use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShadowsocksBean {
    pub server: String,
    pub port: u16,
    #[serde(alias = "cipher")]
    pub method: String,
    pub password: String,
    /// SIP003 plugin spec, e.g. "obfs-local;obfs=http".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShadowsocksRBean {
    pub server: String,
    pub port: u16,
    pub method: String,
    pub password: String,
    #[serde(default)]
    pub obfs: String,
    #[serde(default)]
    pub obfs_param: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub protocol_param: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowsocks_cipher_alias() {
        let bean: ShadowsocksBean = serde_yaml::from_str(
            "server: example.com\nport: 8388\ncipher: aes-256-gcm\npassword: pw",
        )
        .unwrap();
        assert_eq!(bean.method, "aes-256-gcm");
    }
}
