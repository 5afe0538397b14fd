//! Aggregate engine config assembly.
//!
//! Merges every in-process hop into the structured config handed to the
//! tunneling engine, and represents external/nested hops as loopback
//! outbounds pointing at their workers' listening ports. The outbound
//! tagged `proxy` is the engine's default route.
//!
//! Wiring rules:
//! - an in-process hop that forwards to a following hop carries an
//!   `upstream` linkage naming the next hop's outbound tag;
//! - an external hop becomes a `socks` outbound dialing
//!   `127.0.0.1:<hop port>` (shadowtls workers speak raw TCP, so they
//!   get a `redirect` outbound instead);
//! - a balancer contributes one outbound per member plus a balancer
//!   group multiplexing the shared listening port;
//! - a mux block is attached only to the terminal hop or balancer
//!   members, and only when the session has multiplexing enabled.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::LOCALHOST;
use crate::bean::{ProxyBean, SocksVersion, SshAuth};
use crate::error::{OrchestrateError, Result};
use crate::launch::LaunchMode;
use crate::port_spec::PortSpec;
use crate::topology::{CompiledHop, ResolvedTopology, TopologyKind};

/// Default engine route tag; also the balancer group tag.
pub const TAG_AGENT: &str = "proxy";
pub const TAG_SOCKS_IN: &str = "socks-in";
pub const TAG_BALANCER_IN: &str = "balancer-in";

const MUX_CONCURRENCY: u32 = 8;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsConfig {
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Inbound {
    pub tag: String,
    pub listen: String,
    pub port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MuxSettings {
    pub enabled: bool,
    pub concurrency: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Outbound {
    pub tag: String,
    pub protocol: String,
    pub settings: Value,
    /// Tag of the outbound this hop's traffic is tunneled through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux: Option<MuxSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalancerGroup {
    pub tag: String,
    pub selector: Vec<String>,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,
    pub probe_interval: u32,
}

/// The aggregate configuration consumed by the tunneling engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub log: LogConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub balancers: Vec<BalancerGroup>,
}

impl EngineConfig {
    pub fn to_json(&self) -> std::io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn outbound(&self, tag: &str) -> Option<&Outbound> {
        self.outbounds.iter().find(|o| o.tag == tag)
    }
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// The engine's local SOCKS entry port.
    pub socks_port: u16,
    pub enable_mux: bool,
    pub verbose: bool,
    pub dns_servers: Vec<String>,
    pub balancer_probe_fallback_url: String,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            socks_port: 2080,
            enable_mux: false,
            verbose: false,
            dns_servers: vec![],
            balancer_probe_fallback_url: "http://cp.cloudflare.com/".to_string(),
        }
    }
}

fn hop_tag(hop: &CompiledHop) -> String {
    if hop.position == 0 && !hop.is_balancer_member {
        TAG_AGENT.to_string()
    } else {
        format!("{}-{}", TAG_AGENT, hop.node.id)
    }
}

/// Builds the aggregate config. `root` is the selected profile the
/// topology was resolved from (its balancer policy, if any, shapes the
/// group); `modes` runs parallel to `topology.hops`.
pub fn assemble(
    root: &crate::bean::ProfileNode,
    topology: &ResolvedTopology,
    modes: &[LaunchMode],
    options: &AssembleOptions,
) -> Result<EngineConfig> {
    let mut inbounds = vec![Inbound {
        tag: TAG_SOCKS_IN.to_string(),
        listen: LOCALHOST.to_string(),
        port: options.socks_port,
        protocol: "socks".to_string(),
    }];

    let mut outbounds = Vec::with_capacity(topology.hops.len());
    let mut balancers = vec![];

    for (index, hop) in topology.hops.iter().enumerate() {
        let mode = modes[index];
        let tag = hop_tag(hop);
        let mut outbound = match mode {
            LaunchMode::ExternalWorker | LaunchMode::NestedInstance => {
                worker_outbound(hop, &tag)
            }
            LaunchMode::InProcess => in_process_outbound(hop, &tag)?,
        };

        // Forwarding linkage: hop i tunnels through hop i+1. Workers do
        // their own forwarding (compiled to dial the next hop's loopback
        // port), so only in-process hops get the engine-side link.
        if !hop.is_last && mode == LaunchMode::InProcess {
            outbound.upstream = Some(hop_tag(&topology.hops[index + 1]));
        }

        let muxable = matches!(
            hop.node.bean,
            ProxyBean::Vmess(_) | ProxyBean::Vless(_) | ProxyBean::Trojan(_)
        );
        if options.enable_mux
            && mode == LaunchMode::InProcess
            && muxable
            && (hop.is_last || hop.is_balancer_member)
        {
            outbound.mux = Some(MuxSettings {
                enabled: true,
                concurrency: MUX_CONCURRENCY,
            });
        }

        outbounds.push(outbound);
    }

    if topology.kind == TopologyKind::Balancer {
        let shared_port = topology
            .shared_port()
            .expect("balancer topology always has a shared port");
        inbounds.push(Inbound {
            tag: TAG_BALANCER_IN.to_string(),
            listen: LOCALHOST.to_string(),
            port: shared_port,
            protocol: "socks".to_string(),
        });

        // Exactly one externally-visible port; members stay internal.
        let (strategy, probe_url, probe_interval) = balancer_policy(root, options);
        balancers.push(BalancerGroup {
            tag: TAG_AGENT.to_string(),
            selector: topology.hops.iter().map(hop_tag).collect(),
            strategy,
            probe_url,
            probe_interval,
        });
    }

    Ok(EngineConfig {
        log: LogConfig {
            level: if options.verbose { "debug" } else { "error" }.to_string(),
        },
        dns: if options.dns_servers.is_empty() {
            None
        } else {
            Some(DnsConfig {
                servers: options.dns_servers.clone(),
            })
        },
        inbounds,
        outbounds,
        balancers,
    })
}

fn balancer_policy(
    root: &crate::bean::ProfileNode,
    options: &AssembleOptions,
) -> (String, Option<String>, u32) {
    use crate::bean::BalancerStrategy;

    let mut strategy = BalancerStrategy::RoundRobin;
    let mut probe_url = None;
    let mut probe_interval = 60;
    if let ProxyBean::Balancer(bean) = &root.bean {
        strategy = bean.strategy.clone();
        probe_url = bean.probe_url.clone();
        probe_interval = bean.probe_interval;
    }
    let strategy = match strategy {
        BalancerStrategy::RoundRobin => "round-robin".to_string(),
        BalancerStrategy::LeastPing => "least-ping".to_string(),
    };
    let probe_url = probe_url.or_else(|| Some(options.balancer_probe_fallback_url.clone()));
    (strategy, probe_url, probe_interval)
}

/// Loopback outbound for a hop backed by a worker or nested instance.
fn worker_outbound(hop: &CompiledHop, tag: &str) -> Outbound {
    // shadowtls exposes a raw TCP tunnel rather than a SOCKS interface.
    let protocol = match hop.node.bean {
        ProxyBean::ShadowTls(_) => "redirect",
        _ => "socks",
    };
    Outbound {
        tag: tag.to_string(),
        protocol: protocol.to_string(),
        settings: json!({
            "address": LOCALHOST,
            "port": hop.local_port(),
        }),
        upstream: None,
        mux: None,
    }
}

fn in_process_outbound(hop: &CompiledHop, tag: &str) -> Result<Outbound> {
    let bean = &hop.node.bean;
    let (protocol, settings) = match bean {
        ProxyBean::Socks(bean) => (
            "socks",
            json!({
                "address": bean.server,
                "port": bean.port,
                "version": match bean.version {
                    SocksVersion::V4 => "4",
                    SocksVersion::V4a => "4a",
                    SocksVersion::V5 => "5",
                },
                "username": bean.username,
                "password": bean.password,
            }),
        ),
        ProxyBean::Http(bean) => (
            "http",
            json!({
                "address": bean.server,
                "port": bean.port,
                "username": bean.username,
                "password": bean.password,
                "tls": bean.tls,
                "sni": bean.sni,
            }),
        ),
        ProxyBean::Shadowsocks(bean) => (
            "shadowsocks",
            json!({
                "address": bean.server,
                "port": bean.port,
                "method": bean.method,
                "password": bean.password,
                "plugin": bean.plugin,
            }),
        ),
        ProxyBean::ShadowsocksR(bean) => (
            "shadowsocks",
            json!({
                "address": bean.server,
                "port": bean.port,
                "method": bean.method,
                "password": bean.password,
                "plugin": "shadowsocksr",
                "plugin_args": [
                    format!("--obfs={}", bean.obfs),
                    format!("--obfs-param={}", bean.obfs_param),
                    format!("--protocol={}", bean.protocol),
                    format!("--protocol-param={}", bean.protocol_param),
                ],
            }),
        ),
        ProxyBean::Vmess(bean) => (
            "vmess",
            json!({
                "address": bean.server,
                "port": bean.port,
                "user_id": bean.user_id,
                "alter_id": bean.alter_id,
                "security": bean.encryption.as_deref().unwrap_or("auto"),
                "packet_encoding": bean.packet_encoding.as_str(),
                "transport": to_value(&bean.transport)?,
                "tls": to_value(&bean.tls)?,
            }),
        ),
        ProxyBean::Vless(bean) => (
            "vless",
            json!({
                "address": bean.server,
                "port": bean.port,
                "user_id": bean.user_id,
                "flow": bean.flow,
                "packet_encoding": bean.packet_encoding.as_str(),
                "transport": to_value(&bean.transport)?,
                "tls": to_value(&bean.tls)?,
            }),
        ),
        ProxyBean::Trojan(bean) => (
            "trojan",
            json!({
                "address": bean.server,
                "port": bean.port,
                "password": bean.password,
                "transport": to_value(&bean.transport)?,
                "tls": to_value(&bean.tls)?,
            }),
        ),
        ProxyBean::Ssh(bean) => (
            "ssh",
            json!({
                "address": bean.server,
                "port": bean.port,
                "username": bean.username,
                "auth": match &bean.auth {
                    SshAuth::Password { password } => json!({
                        "password": password,
                    }),
                    SshAuth::PrivateKey { key, passphrase } => json!({
                        "private_key": key,
                        "passphrase": passphrase,
                    }),
                },
                "host_public_key": bean.public_key,
            }),
        ),
        ProxyBean::Wireguard(bean) => (
            "wireguard",
            json!({
                "address": bean.server,
                "port": bean.port,
                "local_address": bean.local_address.iter().collect::<Vec<_>>(),
                "private_key": bean.private_key,
                "peer_public_key": bean.peer_public_key,
                "peer_pre_shared_key": bean.peer_pre_shared_key,
                "mtu": bean.mtu,
                "reserved": bean.reserved,
            }),
        ),
        ProxyBean::Hysteria2(bean) => {
            let spec = PortSpec::parse(&bean.ports)?;
            (
                "hysteria2",
                json!({
                    "address": bean.server,
                    "port": spec.dial_port(),
                    "auth": bean.auth,
                    "obfs_password": bean.obfs_password,
                    "up_mbps": bean.up_mbps,
                    "down_mbps": bean.down_mbps,
                    "tls": {
                        "sni": bean.sni.as_deref().unwrap_or(&bean.server),
                        "allow_insecure": bean.allow_insecure,
                        "pin_sha256": bean.pin_sha256,
                    },
                }),
            )
        }
        ProxyBean::Custom(bean) => {
            // Raw outbound object merged as-is.
            let value: Value = serde_json::from_str(&bean.content).map_err(|e| {
                OrchestrateError::IncompatibleMember {
                    id: hop.node.id,
                    reason: format!("invalid engine outbound JSON: {e}"),
                }
            })?;
            let protocol = value
                .get("protocol")
                .and_then(Value::as_str)
                .unwrap_or("custom")
                .to_string();
            let settings = value.get("settings").cloned().unwrap_or(value);
            return Ok(Outbound {
                tag: tag.to_string(),
                protocol,
                settings,
                upstream: None,
                mux: None,
            });
        }
        _ => {
            return Err(OrchestrateError::UnsupportedProtocol {
                hop: hop.position + 1,
                protocol: bean.protocol_name(),
            });
        }
    };

    Ok(Outbound {
        tag: tag.to_string(),
        protocol: protocol.to_string(),
        settings,
        upstream: None,
        mux: None,
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| OrchestrateError::ConfigWrite {
        path: std::path::PathBuf::from("<aggregate config>"),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}
