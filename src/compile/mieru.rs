//! Mieru worker config (JSON). Unusually for the worker family, mieru
//! takes the config file path through an environment variable rather
//! than argv; the launch decider handles that part.

use serde_json::{Map, Value, json};

use crate::bean::{MieruBean, MieruTransport};
use crate::error::Result;

use super::{ArtifactFormat, CompileContext, ConfigArtifact, to_pretty_json};

pub fn build(bean: &MieruBean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let mut server = Map::new();
    if ctx.upstream.address().is_ip() {
        server.insert(
            "ipAddress".to_string(),
            ctx.upstream.address().to_string().into(),
        );
    } else {
        server.insert(
            "domainName".to_string(),
            ctx.upstream.address().to_string().into(),
        );
    }
    server.insert(
        "portBindings".to_string(),
        json!([{
            "port": ctx.upstream.port(),
            "protocol": bean.transport.as_str(),
        }]),
    );

    let mut profile = Map::new();
    profile.insert("profileName".to_string(), "default".into());
    profile.insert(
        "user".to_string(),
        json!({ "userName": bean.username, "password": bean.password }),
    );
    profile.insert("servers".to_string(), json!([Value::Object(server)]));
    if bean.transport == MieruTransport::Udp {
        profile.insert("mtu".to_string(), bean.mtu.into());
    }
    profile.insert(
        "multiplexing".to_string(),
        json!({ "level": bean.multiplexing.as_str() }),
    );

    let conf = json!({
        "profiles": [Value::Object(profile)],
        "activeProfile": "default",
        "socks5Port": ctx.local_port,
        "loggingLevel": if ctx.verbose { "INFO" } else { "ERROR" },
        "socks5ListenLAN": false,
    });

    Ok(ConfigArtifact {
        format: ArtifactFormat::Json,
        bytes: to_pretty_json(&conf),
        side_files: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NetLocation;
    use crate::bean::{ProfileNode, ProxyBean};

    #[test]
    fn test_round_trips_user_and_server() {
        let node: ProfileNode = serde_yaml::from_str(
            "id: 1\ntype: mieru\nserver: example.com\nport: 27017\nusername: alice\npassword: hunter2",
        )
        .unwrap();
        let bean = match node.bean {
            ProxyBean::Mieru(bean) => bean,
            _ => unreachable!(),
        };
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:27017", None).unwrap();
        let ctx = CompileContext {
            cache_dir: dir.path(),
            local_port: 20000,
            upstream: &upstream,
            chained: false,
            enable_mux: false,
            verbose: false,
            protect_path: None,
        };
        let artifact = build(&bean, &ctx).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();
        let profile = &parsed["profiles"][0];
        assert_eq!(profile["user"]["userName"].as_str(), Some("alice"));
        assert_eq!(
            profile["servers"][0]["domainName"].as_str(),
            Some("example.com")
        );
        assert_eq!(
            profile["servers"][0]["portBindings"][0]["port"].as_u64(),
            Some(27017)
        );
        assert_eq!(parsed["socks5Port"].as_u64(), Some(20000));
    }
}
