//! Launch decision: maps each compiled hop to an execution mode and, for
//! external workers, the exact argv/env convention its binary expects.
//!
//! Conventions are per-protocol and fixed: config-file flag (`-c`,
//! `-config`, `--config`), positional config path (naive), argv-only
//! (brook, shadowtls), or environment-variable config (mieru). Getting
//! these wrong fails silently at runtime, so they are snapshot-tested.

use std::path::{Path, PathBuf};

use crate::LOCALHOST;
use crate::address::NetLocation;
use crate::bean::{BrookProtocol, ProxyBean};
use crate::error::{OrchestrateError, Result};
use crate::topology::CompiledHop;

/// TLS trust override pair handed to every worker when the system trust
/// store is not used.
pub const ENV_SSL_CERT_FILE: &str = "SSL_CERT_FILE";
pub const ENV_SSL_CERT_DIR: &str = "SSL_CERT_DIR";
/// Mieru takes its whole config through the environment.
pub const ENV_MIERU_CONFIG: &str = "MIERU_CONFIG_JSON_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Natively handled by the tunneling engine; merged into the
    /// aggregate config.
    InProcess,
    /// Dedicated worker subprocess.
    ExternalWorker,
    /// Custom config delegated to a nested engine instance.
    NestedInstance,
}

/// The external worker binaries this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    TrojanGo,
    Naive,
    Brook,
    Hysteria,
    Hysteria2,
    Mieru,
    Tuic,
    Tuic5,
    ShadowTls,
    Juicity,
}

impl WorkerKind {
    pub fn binary_name(&self) -> &'static str {
        match self {
            WorkerKind::TrojanGo => "trojan-go",
            WorkerKind::Naive => "naive",
            WorkerKind::Brook => "brook",
            WorkerKind::Hysteria => "hysteria",
            WorkerKind::Hysteria2 => "hysteria2",
            WorkerKind::Mieru => "mieru",
            WorkerKind::Tuic => "tuic",
            WorkerKind::Tuic5 => "tuic5",
            WorkerKind::ShadowTls => "shadow-tls",
            WorkerKind::Juicity => "juicity",
        }
    }

    /// Artifact file stem for this worker's config.
    pub fn config_stem(&self) -> &'static str {
        match self {
            WorkerKind::TrojanGo => "trojan_go",
            WorkerKind::Naive => "naive",
            WorkerKind::Brook => "brook",
            WorkerKind::Hysteria => "hysteria",
            WorkerKind::Hysteria2 => "hysteria2",
            WorkerKind::Mieru => "mieru",
            WorkerKind::Tuic => "tuic",
            WorkerKind::Tuic5 => "tuic5",
            WorkerKind::ShadowTls => "shadow_tls",
            WorkerKind::Juicity => "juicity",
        }
    }

    /// Resolves the worker binary: an existing file under `worker_dir`
    /// wins, otherwise the bare name is left to PATH lookup at spawn.
    pub fn resolve(&self, worker_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = worker_dir {
            let candidate = dir.join(self.binary_name());
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from(self.binary_name())
    }
}

/// Session-level policy inputs to the launch decision.
#[derive(Debug, Clone, Default)]
pub struct RuntimeFlags {
    pub enable_mux: bool,
    pub verbose_worker_logs: bool,
    /// Use the OS trust store; when false, workers get the trust
    /// override environment pair.
    pub system_trust_store: bool,
    pub trust_anchor_file: Option<PathBuf>,
    /// Run hysteria2 through the engine instead of its worker when the
    /// hop configuration allows it.
    pub hysteria2_in_engine: bool,
    /// Session runs under a system TUN: QUIC workers must protect their
    /// sockets from being routed back into the tunnel.
    pub under_system_tun: bool,
}

/// One hop's launch plan.
#[derive(Debug)]
pub struct LaunchPlan {
    pub mode: LaunchMode,
    pub worker: Option<WorkerKind>,
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub config_path: Option<PathBuf>,
    pub requires_protect: bool,
}

/// Which mode a bean runs in under the given flags.
pub fn launch_mode(bean: &ProxyBean, flags: &RuntimeFlags) -> LaunchMode {
    match bean {
        ProxyBean::TrojanGo(_)
        | ProxyBean::Naive(_)
        | ProxyBean::Brook(_)
        | ProxyBean::Hysteria(_)
        | ProxyBean::Mieru(_)
        | ProxyBean::Tuic(_)
        | ProxyBean::Tuic5(_)
        | ProxyBean::ShadowTls(_)
        | ProxyBean::Juicity(_) => LaunchMode::ExternalWorker,
        ProxyBean::Hysteria2(_) => {
            if flags.hysteria2_in_engine && bean.supports_chaining() {
                LaunchMode::InProcess
            } else {
                LaunchMode::ExternalWorker
            }
        }
        ProxyBean::Custom(custom) => {
            if custom.is_engine_outbound() {
                LaunchMode::InProcess
            } else {
                LaunchMode::NestedInstance
            }
        }
        ProxyBean::Socks(_)
        | ProxyBean::Http(_)
        | ProxyBean::Shadowsocks(_)
        | ProxyBean::ShadowsocksR(_)
        | ProxyBean::Vmess(_)
        | ProxyBean::Vless(_)
        | ProxyBean::Trojan(_)
        | ProxyBean::Ssh(_)
        | ProxyBean::Wireguard(_) => LaunchMode::InProcess,
        ProxyBean::Chain(_) | ProxyBean::Balancer(_) => LaunchMode::InProcess,
    }
}

fn worker_kind(bean: &ProxyBean) -> Option<WorkerKind> {
    match bean {
        ProxyBean::TrojanGo(_) => Some(WorkerKind::TrojanGo),
        ProxyBean::Naive(_) => Some(WorkerKind::Naive),
        ProxyBean::Brook(_) => Some(WorkerKind::Brook),
        ProxyBean::Hysteria(_) => Some(WorkerKind::Hysteria),
        ProxyBean::Hysteria2(_) => Some(WorkerKind::Hysteria2),
        ProxyBean::Mieru(_) => Some(WorkerKind::Mieru),
        ProxyBean::Tuic(_) => Some(WorkerKind::Tuic),
        ProxyBean::Tuic5(_) => Some(WorkerKind::Tuic5),
        ProxyBean::ShadowTls(_) => Some(WorkerKind::ShadowTls),
        ProxyBean::Juicity(_) => Some(WorkerKind::Juicity),
        _ => None,
    }
}

/// Whether this hop's worker opens raw UDP/QUIC sockets that would loop
/// back into a system TUN without the protect bypass.
fn needs_protect(bean: &ProxyBean, flags: &RuntimeFlags) -> bool {
    if !flags.under_system_tun {
        return false;
    }
    match bean {
        ProxyBean::Hysteria(_)
        | ProxyBean::Hysteria2(_)
        | ProxyBean::Tuic(_)
        | ProxyBean::Tuic5(_)
        | ProxyBean::Juicity(_) => true,
        ProxyBean::Brook(bean) => bean.protocol == BrookProtocol::Quic,
        _ => false,
    }
}

/// Builds the launch plan for one hop. `config_path` is the written
/// artifact for workers that take one; `upstream` is what the worker
/// dials (already chain-resolved by the session).
pub fn decide(
    hop: &CompiledHop,
    upstream: &NetLocation,
    config_path: Option<&Path>,
    flags: &RuntimeFlags,
    worker_dir: Option<&Path>,
) -> Result<LaunchPlan> {
    let bean = &hop.node.bean;

    if bean.is_group() {
        return Err(OrchestrateError::UnsupportedProtocol {
            hop: hop.position + 1,
            protocol: bean.protocol_name(),
        });
    }

    let mode = launch_mode(bean, flags);
    let requires_protect = needs_protect(bean, flags);

    if mode != LaunchMode::ExternalWorker {
        return Ok(LaunchPlan {
            mode,
            worker: None,
            program: None,
            args: vec![],
            env: vec![],
            config_path: None,
            requires_protect,
        });
    }

    let kind = worker_kind(bean).ok_or(OrchestrateError::UnsupportedProtocol {
        hop: hop.position + 1,
        protocol: bean.protocol_name(),
    })?;
    let program = kind.resolve(worker_dir);

    let mut env = Vec::new();
    if !flags.system_trust_store {
        if let Some(trust_anchor) = flags.trust_anchor_file.as_deref() {
            env.push((
                ENV_SSL_CERT_FILE.to_string(),
                trust_anchor.to_string_lossy().into_owned(),
            ));
            // Keep workers off the system cert directories entirely.
            env.push((ENV_SSL_CERT_DIR.to_string(), "/not_exists".to_string()));
        }
    }

    let config_arg = |path: Option<&Path>| -> String {
        path.map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let args = match bean {
        ProxyBean::TrojanGo(_) => {
            vec!["-config".to_string(), config_arg(config_path)]
        }
        ProxyBean::Naive(_) => {
            vec![config_arg(config_path)]
        }
        ProxyBean::Hysteria(_) => vec![
            "--no-check".to_string(),
            "--config".to_string(),
            config_arg(config_path),
            "--log-level".to_string(),
            if flags.verbose_worker_logs {
                "trace"
            } else {
                "warn"
            }
            .to_string(),
            "client".to_string(),
        ],
        ProxyBean::Hysteria2(_) => vec![
            "--disable-update-check".to_string(),
            "--config".to_string(),
            config_arg(config_path),
            "--log-level".to_string(),
            if flags.verbose_worker_logs {
                "debug"
            } else {
                "warn"
            }
            .to_string(),
            "client".to_string(),
        ],
        ProxyBean::Mieru(_) => {
            env.push((ENV_MIERU_CONFIG.to_string(), config_arg(config_path)));
            vec!["run".to_string()]
        }
        ProxyBean::Tuic(_) | ProxyBean::Tuic5(_) => {
            vec!["-c".to_string(), config_arg(config_path)]
        }
        ProxyBean::Juicity(_) => {
            vec!["run".to_string(), "-c".to_string(), config_arg(config_path)]
        }
        ProxyBean::ShadowTls(bean) => {
            let mut args = Vec::new();
            if bean.v3 {
                args.push("--v3".to_string());
            }
            args.push("client".to_string());
            args.push("--listen".to_string());
            args.push(format!("{}:{}", LOCALHOST, hop.local_port()));
            args.push("--server".to_string());
            args.push(upstream.to_string());
            if let Some(sni) = bean.sni.as_deref() {
                args.push("--sni".to_string());
                args.push(sni.to_string());
            }
            if let Some(alpn) = bean.alpn.as_deref() {
                args.push("--alpn".to_string());
                args.push(alpn.to_string());
            }
            if let Some(password) = bean.password.as_deref() {
                args.push("--password".to_string());
                args.push(password.to_string());
            }
            args
        }
        ProxyBean::Brook(bean) => vec![
            bean.protocol.client_subcommand().to_string(),
            "--link".to_string(),
            brook_link(bean, upstream),
            "--socks5".to_string(),
            format!("{}:{}", LOCALHOST, hop.local_port()),
        ],
        _ => unreachable!("worker_kind covered every external protocol"),
    };

    Ok(LaunchPlan {
        mode,
        worker: Some(kind),
        program: Some(program),
        args,
        env,
        config_path: config_path.map(Path::to_path_buf),
        requires_protect,
    })
}

/// The brook worker takes its server parameters as a single link URI.
fn brook_link(bean: &crate::bean::BrookBean, upstream: &NetLocation) -> String {
    use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

    let password = utf8_percent_encode(&bean.password, NON_ALPHANUMERIC);
    let path = bean.path.as_deref().unwrap_or("/ws");
    match bean.protocol {
        BrookProtocol::Tcp => {
            format!("brook://server?password={password}&server={upstream}")
        }
        BrookProtocol::Ws => {
            let endpoint = utf8_percent_encode(&format!("ws://{upstream}{path}"), NON_ALPHANUMERIC)
                .to_string();
            format!("brook://wsserver?password={password}&wsserver={endpoint}")
        }
        BrookProtocol::Wss => {
            let endpoint =
                utf8_percent_encode(&format!("wss://{upstream}{path}"), NON_ALPHANUMERIC)
                    .to_string();
            let mut link =
                format!("brook://wssserver?password={password}&wssserver={endpoint}");
            if bean.insecure {
                link.push_str("&insecure=true");
            }
            link
        }
        BrookProtocol::Quic => {
            let endpoint =
                utf8_percent_encode(&format!("quic://{upstream}"), NON_ALPHANUMERIC).to_string();
            format!("brook://quicserver?password={password}&quicserver={endpoint}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::ProfileNode;
    use crate::store::MemoryProfileStore;
    use crate::topology::resolve;

    fn hop_for(yaml: &str) -> CompiledHop {
        let node: ProfileNode = serde_yaml::from_str(yaml).unwrap();
        let store = MemoryProfileStore::new();
        let mut topology = resolve(&store, &node).unwrap();
        topology.hops.remove(0)
    }

    fn upstream() -> NetLocation {
        NetLocation::from_str("example.com:443", None).unwrap()
    }

    #[test]
    fn test_in_process_modes() {
        let flags = RuntimeFlags::default();
        let vmess: ProfileNode = serde_yaml::from_str(
            "id: 1\ntype: vmess\nserver: example.com\nport: 443\nuser_id: b0e80a62-8a51-47f0-91f1-f0f7faf8d9d4",
        )
        .unwrap();
        assert_eq!(launch_mode(&vmess.bean, &flags), LaunchMode::InProcess);

        let naive: ProfileNode =
            serde_yaml::from_str("id: 2\ntype: naive\nserver: example.com\nport: 443").unwrap();
        assert_eq!(launch_mode(&naive.bean, &flags), LaunchMode::ExternalWorker);
    }

    #[test]
    fn test_hysteria2_engine_provider_flag() {
        let node: ProfileNode = serde_yaml::from_str(
            "id: 1\ntype: hysteria2\nserver: example.com\nports: \"443\"",
        )
        .unwrap();
        let mut flags = RuntimeFlags::default();
        assert_eq!(launch_mode(&node.bean, &flags), LaunchMode::ExternalWorker);
        flags.hysteria2_in_engine = true;
        assert_eq!(launch_mode(&node.bean, &flags), LaunchMode::InProcess);

        // A hopping spec cannot go through the engine.
        let hopping: ProfileNode = serde_yaml::from_str(
            "id: 2\ntype: hysteria2\nserver: example.com\nports: \"2000-3000\"",
        )
        .unwrap();
        assert_eq!(
            launch_mode(&hopping.bean, &flags),
            LaunchMode::ExternalWorker
        );
    }

    #[test]
    fn test_custom_bean_modes() {
        let flags = RuntimeFlags::default();
        let outbound: ProfileNode = serde_yaml::from_str(
            "id: 1\ntype: custom\nkind: engine_outbound\ncontent: \"{}\"",
        )
        .unwrap();
        assert_eq!(launch_mode(&outbound.bean, &flags), LaunchMode::InProcess);

        let nested: ProfileNode = serde_yaml::from_str(
            "id: 2\ntype: custom\nkind: engine_config\ncontent: \"{}\"",
        )
        .unwrap();
        assert_eq!(
            launch_mode(&nested.bean, &flags),
            LaunchMode::NestedInstance
        );
    }

    #[test]
    fn test_naive_positional_config() {
        let hop = hop_for("id: 1\ntype: naive\nserver: example.com\nport: 443");
        let up = upstream();
        let plan = decide(
            &hop,
            &up,
            Some(Path::new("/tmp/cache/naive_1.json")),
            &RuntimeFlags::default(),
            None,
        )
        .unwrap();
        assert_eq!(plan.args, vec!["/tmp/cache/naive_1.json"]);
        assert_eq!(plan.program.unwrap(), PathBuf::from("naive"));
    }

    #[test]
    fn test_hysteria2_argv_convention() {
        let hop =
            hop_for("id: 1\ntype: hysteria2\nserver: example.com\nports: \"443\"");
        let up = upstream();
        let plan = decide(
            &hop,
            &up,
            Some(Path::new("/tmp/cache/hysteria2_1.yaml")),
            &RuntimeFlags::default(),
            None,
        )
        .unwrap();
        assert_eq!(
            plan.args,
            vec![
                "--disable-update-check",
                "--config",
                "/tmp/cache/hysteria2_1.yaml",
                "--log-level",
                "warn",
                "client",
            ]
        );
    }

    #[test]
    fn test_mieru_config_via_environment() {
        let hop = hop_for(
            "id: 1\ntype: mieru\nserver: example.com\nport: 27017\nusername: alice\npassword: pw",
        );
        let up = upstream();
        let plan = decide(
            &hop,
            &up,
            Some(Path::new("/tmp/cache/mieru_1.json")),
            &RuntimeFlags::default(),
            None,
        )
        .unwrap();
        assert_eq!(plan.args, vec!["run"]);
        assert!(plan
            .env
            .iter()
            .any(|(k, v)| k == ENV_MIERU_CONFIG && v == "/tmp/cache/mieru_1.json"));
    }

    #[test]
    fn test_shadowtls_argv_only() {
        let hop = hop_for(
            "id: 1\ntype: shadowtls\nserver: example.com\nport: 443\npassword: pw\nsni: cdn.example.com",
        );
        let local_port = hop.local_port();
        let up = upstream();
        let plan = decide(&hop, &up, None, &RuntimeFlags::default(), None).unwrap();
        assert!(plan.config_path.is_none());
        assert_eq!(
            plan.args,
            vec![
                "--v3".to_string(),
                "client".to_string(),
                "--listen".to_string(),
                format!("127.0.0.1:{local_port}"),
                "--server".to_string(),
                "example.com:443".to_string(),
                "--sni".to_string(),
                "cdn.example.com".to_string(),
                "--password".to_string(),
                "pw".to_string(),
            ]
        );
    }

    #[test]
    fn test_brook_link_argv() {
        let hop = hop_for(
            "id: 1\ntype: brook\nserver: example.com\nport: 9999\npassword: p w\nprotocol: ws",
        );
        let local_port = hop.local_port();
        let up = NetLocation::from_str("example.com:9999", None).unwrap();
        let plan = decide(&hop, &up, None, &RuntimeFlags::default(), None).unwrap();
        assert_eq!(plan.args[0], "wsclient");
        assert_eq!(plan.args[1], "--link");
        assert!(plan.args[2].starts_with("brook://wsserver?password=p%20w"));
        assert_eq!(plan.args[4], format!("127.0.0.1:{local_port}"));
    }

    #[test]
    fn test_trust_override_env_pair() {
        let hop = hop_for("id: 1\ntype: tuic5\nserver: example.com\nport: 443\nuuid: u\npassword: p");
        let up = upstream();
        let flags = RuntimeFlags {
            trust_anchor_file: Some(PathBuf::from("/data/mozilla_included.pem")),
            ..Default::default()
        };
        let plan = decide(&hop, &up, Some(Path::new("/tmp/t5.json")), &flags, None).unwrap();
        assert!(plan
            .env
            .contains(&(ENV_SSL_CERT_FILE.to_string(), "/data/mozilla_included.pem".to_string())));
        assert!(plan
            .env
            .contains(&(ENV_SSL_CERT_DIR.to_string(), "/not_exists".to_string())));

        // With the system store, no override pair.
        let flags = RuntimeFlags {
            system_trust_store: true,
            trust_anchor_file: Some(PathBuf::from("/data/mozilla_included.pem")),
            ..Default::default()
        };
        let plan = decide(&hop, &up, Some(Path::new("/tmp/t5.json")), &flags, None).unwrap();
        assert!(plan.env.is_empty());
    }

    #[test]
    fn test_protect_only_under_system_tun() {
        let hop = hop_for("id: 1\ntype: tuic5\nserver: example.com\nport: 443\nuuid: u\npassword: p");
        let up = upstream();
        let plan = decide(&hop, &up, None, &RuntimeFlags::default(), None).unwrap();
        assert!(!plan.requires_protect);

        let flags = RuntimeFlags {
            under_system_tun: true,
            ..Default::default()
        };
        let plan = decide(&hop, &up, None, &flags, None).unwrap();
        assert!(plan.requires_protect);
    }

    #[test]
    fn test_worker_dir_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("hysteria2");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        assert_eq!(WorkerKind::Hysteria2.resolve(Some(dir.path())), bin);
        // Missing binaries fall back to PATH lookup.
        assert_eq!(
            WorkerKind::Naive.resolve(Some(dir.path())),
            PathBuf::from("naive")
        );
    }
}
