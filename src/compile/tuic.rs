//! TUIC v4 and v5 worker configs (JSON).

use serde_json::{Map, Value, json};

use crate::bean::{Tuic5Bean, TuicBean};
use crate::error::Result;

use super::{ArtifactFormat, CompileContext, ConfigArtifact, to_pretty_json, write_ca_file};

fn alpn_array(alpn: &str) -> Value {
    Value::Array(
        alpn.split(['\n', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}

pub fn build_v4(bean: &TuicBean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let mut side_files = Vec::new();

    let mut relay = Map::new();
    match bean.sni.as_deref() {
        Some(sni) if !sni.is_empty() => {
            relay.insert("server".to_string(), sni.into());
            relay.insert(
                "ip".to_string(),
                ctx.upstream.address().to_string().into(),
            );
        }
        _ => {
            relay.insert("server".to_string(), bean.server.as_str().into());
            if ctx.upstream.address().is_ip() {
                relay.insert(
                    "ip".to_string(),
                    ctx.upstream.address().to_string().into(),
                );
            }
        }
    }
    relay.insert("port".to_string(), ctx.upstream.port().into());
    relay.insert("token".to_string(), bean.token.as_str().into());

    if let Some(ca_text) = bean.ca.as_deref() {
        let ca_path = write_ca_file(ctx, "tuic", ca_text, &mut side_files)?;
        relay.insert(
            "certificates".to_string(),
            json!([ca_path.to_string_lossy()]),
        );
    }

    relay.insert(
        "udp_relay_mode".to_string(),
        bean.udp_relay_mode.as_str().into(),
    );
    if let Some(alpn) = bean.alpn.as_deref() {
        relay.insert("alpn".to_string(), alpn_array(alpn));
    }
    relay.insert(
        "congestion_controller".to_string(),
        bean.congestion_controller.as_str().into(),
    );
    relay.insert("disable_sni".to_string(), bean.disable_sni.into());
    relay.insert("reduce_rtt".to_string(), bean.reduce_rtt.into());
    relay.insert("max_udp_relay_packet_size".to_string(), bean.mtu.into());

    let conf = json!({
        "relay": Value::Object(relay),
        "local": { "ip": "127.0.0.1", "port": ctx.local_port },
        "log_level": if ctx.verbose { "debug" } else { "info" },
    });

    Ok(ConfigArtifact {
        format: ArtifactFormat::Json,
        bytes: to_pretty_json(&conf),
        side_files,
    })
}

pub fn build_v5(bean: &Tuic5Bean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let mut side_files = Vec::new();

    let server_name = match bean.sni.as_deref() {
        Some(sni) if !sni.is_empty() => sni,
        _ => bean.server.as_str(),
    };
    let server = if server_name.contains(':') {
        format!("[{}]:{}", server_name, ctx.upstream.port())
    } else {
        format!("{}:{}", server_name, ctx.upstream.port())
    };

    let mut relay = Map::new();
    relay.insert("server".to_string(), server.into());
    if ctx.upstream.address().is_ip() {
        relay.insert("ip".to_string(), ctx.upstream.address().to_string().into());
    }
    relay.insert("uuid".to_string(), bean.uuid.as_str().into());
    relay.insert("password".to_string(), bean.password.as_str().into());

    if let Some(ca_text) = bean.ca.as_deref() {
        let ca_path = write_ca_file(ctx, "tuic5", ca_text, &mut side_files)?;
        relay.insert(
            "certificates".to_string(),
            json!([ca_path.to_string_lossy()]),
        );
    }

    relay.insert(
        "udp_relay_mode".to_string(),
        bean.udp_relay_mode.as_str().into(),
    );
    if let Some(alpn) = bean.alpn.as_deref() {
        relay.insert("alpn".to_string(), alpn_array(alpn));
    }
    relay.insert(
        "congestion_control".to_string(),
        bean.congestion_control.as_str().into(),
    );
    relay.insert("disable_sni".to_string(), bean.disable_sni.into());
    relay.insert(
        "zero_rtt_handshake".to_string(),
        bean.zero_rtt_handshake.into(),
    );

    let conf = json!({
        "relay": Value::Object(relay),
        "local": {
            "server": format!("127.0.0.1:{}", ctx.local_port),
            "max_packet_size": bean.mtu,
        },
        "log_level": if ctx.verbose { "debug" } else { "info" },
    });

    Ok(ConfigArtifact {
        format: ArtifactFormat::Json,
        bytes: to_pretty_json(&conf),
        side_files,
    })
}
