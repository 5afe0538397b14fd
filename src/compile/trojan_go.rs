//! trojan-go worker config (JSON).

use serde_json::{Map, Value, json};

use crate::bean::TrojanGoBean;
use crate::error::Result;

use super::{ArtifactFormat, CompileContext, ConfigArtifact, to_pretty_json};

const MUX_CONCURRENCY: u32 = 8;

pub fn build(bean: &TrojanGoBean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let mut conf = Map::new();
    conf.insert("run_type".to_string(), "client".into());
    conf.insert("local_addr".to_string(), "127.0.0.1".into());
    conf.insert("local_port".to_string(), ctx.local_port.into());
    conf.insert(
        "remote_addr".to_string(),
        ctx.upstream.address().to_string().into(),
    );
    conf.insert("remote_port".to_string(), ctx.upstream.port().into());
    conf.insert("password".to_string(), json!([bean.password]));
    conf.insert(
        "log_level".to_string(),
        if ctx.verbose { 0 } else { 2 }.into(),
    );

    if ctx.enable_mux {
        conf.insert(
            "mux".to_string(),
            json!({ "enabled": true, "concurrency": MUX_CONCURRENCY }),
        );
    }

    if bean.websocket {
        conf.insert(
            "websocket".to_string(),
            json!({
                "enabled": true,
                "host": bean.host.as_deref().unwrap_or(""),
                "path": bean.path.as_deref().unwrap_or("/"),
            }),
        );
    }

    let mut ssl = Map::new();
    let server_name = bean.sni.as_deref().unwrap_or(&bean.server);
    if !server_name.is_empty() {
        ssl.insert("sni".to_string(), server_name.into());
    }
    if bean.allow_insecure {
        ssl.insert("verify".to_string(), false.into());
    }
    if let Some(fingerprint) = bean.utls_fingerprint.as_deref() {
        ssl.insert("fingerprint".to_string(), fingerprint.into());
    }
    conf.insert("ssl".to_string(), Value::Object(ssl));

    if let Some(shadowsocks) = bean.shadowsocks.as_ref() {
        conf.insert(
            "shadowsocks".to_string(),
            json!({
                "enabled": true,
                "method": shadowsocks.method,
                "password": shadowsocks.password,
            }),
        );
    }

    Ok(ConfigArtifact {
        format: ArtifactFormat::Json,
        bytes: to_pretty_json(&Value::Object(conf)),
        side_files: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NetLocation;
    use crate::bean::{ProfileNode, ProxyBean};

    #[test]
    fn test_round_trips_address_and_password() {
        let node: ProfileNode = serde_yaml::from_str(
            "id: 1\ntype: trojan-go\nserver: example.com\nport: 443\npassword: hunter2\nwebsocket: true\npath: /tg",
        )
        .unwrap();
        let bean = match node.bean {
            ProxyBean::TrojanGo(bean) => bean,
            _ => unreachable!(),
        };
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let ctx = CompileContext {
            cache_dir: dir.path(),
            local_port: 18000,
            upstream: &upstream,
            chained: false,
            enable_mux: true,
            verbose: false,
            protect_path: None,
        };
        let artifact = build(&bean, &ctx).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(parsed["remote_addr"].as_str(), Some("example.com"));
        assert_eq!(parsed["remote_port"].as_u64(), Some(443));
        assert_eq!(parsed["local_port"].as_u64(), Some(18000));
        assert_eq!(parsed["password"][0].as_str(), Some("hunter2"));
        assert_eq!(parsed["mux"]["enabled"].as_bool(), Some(true));
        assert_eq!(parsed["websocket"]["path"].as_str(), Some("/tg"));
        assert_eq!(parsed["ssl"]["sni"].as_str(), Some("example.com"));
    }
}
