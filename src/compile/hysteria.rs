//! Hysteria v1 (JSON) and v2 (YAML) worker configs.

use serde_json::{Map, Value, json};

use crate::bean::{Hysteria2Bean, HysteriaAuth, HysteriaBean, HysteriaProtocol};
use crate::error::{OrchestrateError, Result};
use crate::port_spec::PortSpec;

use super::{ArtifactFormat, CompileContext, ConfigArtifact, to_pretty_json, write_ca_file};

/// The server field: the raw multi-port spec when hopping, otherwise the
/// single upstream address resolved by the caller.
fn server_field(server: &str, spec: &PortSpec, hopping: bool, ctx: &CompileContext) -> String {
    if hopping {
        if server.contains(':') {
            format!("[{}]:{}", server, spec.text())
        } else {
            format!("{}:{}", server, spec.text())
        }
    } else {
        ctx.upstream.to_string()
    }
}

pub fn build_v1(bean: &HysteriaBean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let spec = PortSpec::parse(&bean.ports)?;
    // Hopping (and faketcp) bypass loopback forwarding entirely, so they
    // are rejected for chained hops at resolve time.
    let hopping = spec.is_multi() && !ctx.chained;

    let mut side_files = Vec::new();
    let mut conf = Map::new();

    conf.insert(
        "server".to_string(),
        server_field(&bean.server, &spec, hopping, ctx).into(),
    );
    match bean.protocol {
        HysteriaProtocol::Udp => {}
        HysteriaProtocol::Faketcp => {
            conf.insert("protocol".to_string(), "faketcp".into());
        }
        HysteriaProtocol::WechatVideo => {
            conf.insert("protocol".to_string(), "wechat-video".into());
        }
    }
    if hopping {
        conf.insert("hop_interval".to_string(), bean.hop_interval.into());
    }
    conf.insert("up_mbps".to_string(), bean.up_mbps.into());
    conf.insert("down_mbps".to_string(), bean.down_mbps.into());
    conf.insert(
        "socks5".to_string(),
        json!({ "listen": format!("127.0.0.1:{}", ctx.local_port) }),
    );
    if let Some(obfs) = bean.obfs.as_deref() {
        conf.insert("obfs".to_string(), obfs.into());
    }
    match &bean.auth {
        Some(HysteriaAuth::Base64(payload)) => {
            conf.insert("auth".to_string(), payload.as_str().into());
        }
        Some(HysteriaAuth::String(payload)) => {
            conf.insert("auth_str".to_string(), payload.as_str().into());
        }
        None => {}
    }

    let server_name = match bean.sni.as_deref() {
        Some(sni) if !sni.is_empty() => Some(sni.to_string()),
        _ => {
            if !hopping && bean.protocol == HysteriaProtocol::Udp {
                Some(bean.server.clone())
            } else {
                None
            }
        }
    };
    if let Some(server_name) = server_name {
        conf.insert("server_name".to_string(), server_name.into());
    }
    if let Some(alpn) = bean.alpn.as_deref() {
        conf.insert("alpn".to_string(), alpn.into());
    }
    if let Some(ca_text) = bean.ca.as_deref() {
        let ca_path = write_ca_file(ctx, "hysteria", ca_text, &mut side_files)?;
        conf.insert("ca".to_string(), ca_path.to_string_lossy().into_owned().into());
    }
    if bean.allow_insecure {
        conf.insert("insecure".to_string(), true.into());
    }
    if bean.recv_window_conn > 0 {
        conf.insert("recv_window_conn".to_string(), bean.recv_window_conn.into());
    }
    if bean.recv_window > 0 {
        conf.insert("recv_window".to_string(), bean.recv_window.into());
    }
    if bean.disable_mtu_discovery {
        conf.insert("disable_mtu_discovery".to_string(), true.into());
    }

    Ok(ConfigArtifact {
        format: ArtifactFormat::Json,
        bytes: to_pretty_json(&Value::Object(conf)),
        side_files,
    })
}

pub fn build_v2(bean: &Hysteria2Bean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let spec = PortSpec::parse(&bean.ports)?;
    let hopping = bean.port_hopping && spec.is_multi() && !ctx.chained;

    let mut side_files = Vec::new();
    let mut conf = Map::new();

    conf.insert(
        "server".to_string(),
        server_field(&bean.server, &spec, hopping, ctx).into(),
    );
    if let Some(auth) = bean.auth.as_deref() {
        conf.insert("auth".to_string(), auth.into());
    }

    let mut tls = Map::new();
    if bean.allow_insecure {
        tls.insert("insecure".to_string(), true.into());
    }
    let server_name = match bean.sni.as_deref() {
        Some(sni) if !sni.is_empty() => Some(sni.to_string()),
        _ => {
            if !hopping {
                Some(bean.server.clone())
            } else {
                None
            }
        }
    };
    if let Some(server_name) = server_name {
        tls.insert("sni".to_string(), server_name.into());
    }
    if let Some(ca_text) = bean.ca.as_deref() {
        let ca_path = write_ca_file(ctx, "hysteria2", ca_text, &mut side_files)?;
        tls.insert("ca".to_string(), ca_path.to_string_lossy().into_owned().into());
    }
    if let Some(pin) = bean.pin_sha256.as_deref() {
        tls.insert("pinSHA256".to_string(), pin.into());
    }
    if !tls.is_empty() {
        conf.insert("tls".to_string(), Value::Object(tls));
    }

    let mut transport = Map::new();
    transport.insert("type".to_string(), "udp".into());
    if hopping {
        transport.insert(
            "udp".to_string(),
            json!({ "hopInterval": format!("{}s", bean.hop_interval) }),
        );
    }
    conf.insert("transport".to_string(), Value::Object(transport));

    if let Some(obfs_password) = bean.obfs_password.as_deref() {
        conf.insert(
            "obfs".to_string(),
            json!({
                "type": "salamander",
                "salamander": { "password": obfs_password },
            }),
        );
    }

    if let Some(protect_path) = ctx.protect_path {
        conf.insert(
            "quic".to_string(),
            json!({ "sockopts": { "fdControlUnixSocket": protect_path } }),
        );
    }

    let mut bandwidth = Map::new();
    if bean.up_mbps > 0 {
        bandwidth.insert("up".to_string(), format!("{} mbps", bean.up_mbps).into());
    }
    if bean.down_mbps > 0 {
        bandwidth.insert("down".to_string(), format!("{} mbps", bean.down_mbps).into());
    }
    if !bandwidth.is_empty() {
        conf.insert("bandwidth".to_string(), Value::Object(bandwidth));
    }

    conf.insert(
        "socks5".to_string(),
        json!({ "listen": format!("127.0.0.1:{}", ctx.local_port) }),
    );
    conf.insert("lazy".to_string(), true.into());
    conf.insert("fastOpen".to_string(), true.into());

    let bytes = serde_yaml::to_string(&Value::Object(conf))
        .map_err(|e| OrchestrateError::ConfigWrite {
            path: ctx.cache_dir.join(format!("hysteria2_{}.yaml", ctx.local_port)),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?
        .into_bytes();

    Ok(ConfigArtifact {
        format: ArtifactFormat::Yaml,
        bytes,
        side_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NetLocation;
    use crate::bean::{ProfileNode, ProxyBean};

    fn hysteria2(yaml_tail: &str) -> Hysteria2Bean {
        let node: ProfileNode = serde_yaml::from_str(&format!(
            "id: 1\ntype: hysteria2\nserver: example.com\n{yaml_tail}"
        ))
        .unwrap();
        match node.bean {
            ProxyBean::Hysteria2(bean) => bean,
            _ => unreachable!(),
        }
    }

    fn ctx<'a>(
        dir: &'a std::path::Path,
        upstream: &'a NetLocation,
        chained: bool,
    ) -> CompileContext<'a> {
        CompileContext {
            cache_dir: dir,
            local_port: 15000,
            upstream,
            chained,
            enable_mux: false,
            verbose: false,
            protect_path: None,
        }
    }

    #[test]
    fn test_v2_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let bean = hysteria2("ports: \"443\"\nauth: hunter2\nsni: sni.example.com");
        let artifact = build_v2(&bean, &ctx(dir.path(), &upstream, false)).unwrap();
        assert_eq!(artifact.format, ArtifactFormat::Yaml);

        let parsed: serde_yaml::Value =
            serde_yaml::from_slice(&artifact.bytes).expect("artifact is valid YAML");
        assert_eq!(parsed["server"].as_str(), Some("example.com:443"));
        assert_eq!(parsed["auth"].as_str(), Some("hunter2"));
        assert_eq!(parsed["tls"]["sni"].as_str(), Some("sni.example.com"));
        assert_eq!(
            parsed["socks5"]["listen"].as_str(),
            Some("127.0.0.1:15000")
        );
    }

    #[test]
    fn test_v2_hopping_preserves_full_port_set() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let bean = hysteria2("ports: \"443,5000-6000\"");
        let artifact = build_v2(&bean, &ctx(dir.path(), &upstream, false)).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&artifact.bytes).unwrap();
        assert_eq!(
            parsed["server"].as_str(),
            Some("example.com:443,5000-6000")
        );
        assert_eq!(
            parsed["transport"]["udp"]["hopInterval"].as_str(),
            Some("10s")
        );
        // No SNI fallback for hopping; TLS section may be absent.
        assert!(parsed["tls"]["sni"].as_str().is_none());
    }

    #[test]
    fn test_v2_chained_pins_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("127.0.0.1:16001", None).unwrap();
        let bean = hysteria2("ports: \"443\"");
        let artifact = build_v2(&bean, &ctx(dir.path(), &upstream, true)).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&artifact.bytes).unwrap();
        assert_eq!(parsed["server"].as_str(), Some("127.0.0.1:16001"));
    }

    #[test]
    fn test_v2_ca_side_file() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let bean = hysteria2("ports: \"443\"\nca: |\n  -----BEGIN CERTIFICATE-----\n  AAAA\n  -----END CERTIFICATE-----");
        let artifact = build_v2(&bean, &ctx(dir.path(), &upstream, false)).unwrap();
        assert_eq!(artifact.side_files.len(), 1);
        let ca_path = &artifact.side_files[0];
        assert!(ca_path.exists());
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&artifact.bytes).unwrap();
        assert_eq!(
            parsed["tls"]["ca"].as_str(),
            Some(ca_path.to_str().unwrap())
        );
    }

    #[test]
    fn test_v2_protect_path_sockopts() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let bean = hysteria2("ports: \"443\"");
        let mut c = ctx(dir.path(), &upstream, false);
        c.protect_path = Some("protect_path");
        let artifact = build_v2(&bean, &c).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&artifact.bytes).unwrap();
        assert_eq!(
            parsed["quic"]["sockopts"]["fdControlUnixSocket"].as_str(),
            Some("protect_path")
        );
    }

    #[test]
    fn test_v1_auth_forms() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let node: ProfileNode = serde_yaml::from_str(
            "id: 1\ntype: hysteria\nserver: example.com\nports: \"443\"\nauth:\n  type: string\n  payload: hunter2",
        )
        .unwrap();
        let bean = match node.bean {
            ProxyBean::Hysteria(bean) => bean,
            _ => unreachable!(),
        };
        let artifact = build_v1(&bean, &ctx(dir.path(), &upstream, false)).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(parsed["auth_str"].as_str(), Some("hunter2"));
        assert_eq!(parsed["server_name"].as_str(), Some("example.com"));
        assert_eq!(
            parsed["socks5"]["listen"].as_str(),
            Some("127.0.0.1:15000")
        );
    }
}
