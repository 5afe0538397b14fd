//! Typed configuration records ("beans"), one per protocol, plus the
//! structural chain/balancer/custom variants.
//!
//! [`ProxyBean`] is a closed tagged union: the serde `type` tag and the
//! populated variant are the same thing, so a node's protocol tag can
//! never disagree with its bean. Every dispatch site in the compiler,
//! launch decider, and link codecs matches exhaustively; adding a
//! protocol is a single-point, compile-checked change.

pub mod brook;
pub mod common;
pub mod group;
pub mod hysteria;
pub mod juicity;
pub mod mieru;
pub mod naive;
pub mod shadowsocks;
pub mod shadowtls;
pub mod socks_http;
pub mod ssh;
pub mod trojan_go;
pub mod tuic;
pub mod v2ray;
pub mod wireguard;

use serde::{Deserialize, Serialize};

use crate::address::NetLocation;
use crate::port_spec::PortSpec;

pub use brook::{BrookBean, BrookProtocol};
pub use group::{BalancerBean, BalancerStrategy, ChainBean, CustomBean};
pub use hysteria::{Hysteria2Bean, HysteriaAuth, HysteriaBean, HysteriaProtocol};
pub use juicity::JuicityBean;
pub use mieru::{MieruBean, MieruMultiplexing, MieruTransport};
pub use naive::{NaiveBean, NaiveProto};
pub use shadowsocks::{ShadowsocksBean, ShadowsocksRBean};
pub use shadowtls::ShadowTlsBean;
pub use socks_http::{HttpBean, SocksBean, SocksVersion};
pub use ssh::{SshAuth, SshBean};
pub use trojan_go::{TrojanGoBean, TrojanGoShadowsocks};
pub use tuic::{Tuic5Bean, TuicBean};
pub use v2ray::{PacketEncoding, TrojanBean, VlessBean, VmessBean};
pub use wireguard::WireGuardBean;

/// Unique profile identifier, assigned by the profile store.
pub type ProfileId = u64;

/// One proxy hop definition: identity plus exactly one protocol bean.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProfileNode {
    pub id: ProfileId,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub bean: ProxyBean,
}

impl ProfileNode {
    /// Display label used in logs and failure reasons.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{} #{}", self.bean.protocol_name(), self.id)
        } else {
            format!("{} ({})", self.name, self.bean.protocol_name())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxyBean {
    Socks(SocksBean),
    Http(HttpBean),
    #[serde(alias = "ss")]
    Shadowsocks(ShadowsocksBean),
    #[serde(alias = "ssr")]
    ShadowsocksR(ShadowsocksRBean),
    Vmess(VmessBean),
    Vless(VlessBean),
    Trojan(TrojanBean),
    #[serde(rename = "trojan-go")]
    TrojanGo(TrojanGoBean),
    Naive(NaiveBean),
    Brook(BrookBean),
    Hysteria(HysteriaBean),
    Hysteria2(Hysteria2Bean),
    Mieru(MieruBean),
    Tuic(TuicBean),
    Tuic5(Tuic5Bean),
    ShadowTls(ShadowTlsBean),
    Juicity(JuicityBean),
    Ssh(SshBean),
    Wireguard(WireGuardBean),
    Chain(ChainBean),
    Balancer(BalancerBean),
    Custom(CustomBean),
}

impl ProxyBean {
    /// Protocol name for display and failure reasons.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProxyBean::Socks(bean) => match bean.version {
                SocksVersion::V4 => "SOCKS4",
                SocksVersion::V4a => "SOCKS4A",
                SocksVersion::V5 => "SOCKS5",
            },
            ProxyBean::Http(bean) => {
                if bean.tls {
                    "HTTPS"
                } else {
                    "HTTP"
                }
            }
            ProxyBean::Shadowsocks(bean) => {
                if bean.method.starts_with("2022-blake3-") {
                    "Shadowsocks 2022"
                } else {
                    "Shadowsocks"
                }
            }
            ProxyBean::ShadowsocksR(_) => "ShadowsocksR",
            ProxyBean::Vmess(_) => "VMess",
            ProxyBean::Vless(_) => "VLESS",
            ProxyBean::Trojan(_) => "Trojan",
            ProxyBean::TrojanGo(_) => "Trojan-Go",
            ProxyBean::Naive(_) => "Naive",
            ProxyBean::Brook(_) => "Brook",
            ProxyBean::Hysteria(_) => "Hysteria",
            ProxyBean::Hysteria2(_) => "Hysteria2",
            ProxyBean::Mieru(_) => "Mieru",
            ProxyBean::Tuic(_) => "TUIC",
            ProxyBean::Tuic5(_) => "TUIC v5",
            ProxyBean::ShadowTls(_) => "ShadowTLS",
            ProxyBean::Juicity(_) => "Juicity",
            ProxyBean::Ssh(_) => "SSH",
            ProxyBean::Wireguard(_) => "WireGuard",
            ProxyBean::Chain(_) => "Chain",
            ProxyBean::Balancer(_) => "Balancer",
            ProxyBean::Custom(_) => "Custom",
        }
    }

    /// True for the structural variants that expand into other hops.
    pub fn is_group(&self) -> bool {
        matches!(self, ProxyBean::Chain(_) | ProxyBean::Balancer(_))
    }

    /// The bean's own server host text, if it has one.
    pub fn server_host(&self) -> Option<&str> {
        match self {
            ProxyBean::Socks(b) => Some(&b.server),
            ProxyBean::Http(b) => Some(&b.server),
            ProxyBean::Shadowsocks(b) => Some(&b.server),
            ProxyBean::ShadowsocksR(b) => Some(&b.server),
            ProxyBean::Vmess(b) => Some(&b.server),
            ProxyBean::Vless(b) => Some(&b.server),
            ProxyBean::Trojan(b) => Some(&b.server),
            ProxyBean::TrojanGo(b) => Some(&b.server),
            ProxyBean::Naive(b) => Some(&b.server),
            ProxyBean::Brook(b) => Some(&b.server),
            ProxyBean::Hysteria(b) => Some(&b.server),
            ProxyBean::Hysteria2(b) => Some(&b.server),
            ProxyBean::Mieru(b) => Some(&b.server),
            ProxyBean::Tuic(b) => Some(&b.server),
            ProxyBean::Tuic5(b) => Some(&b.server),
            ProxyBean::ShadowTls(b) => Some(&b.server),
            ProxyBean::Juicity(b) => Some(&b.server),
            ProxyBean::Ssh(b) => Some(&b.server),
            ProxyBean::Wireguard(b) => Some(&b.server),
            ProxyBean::Chain(_) | ProxyBean::Balancer(_) | ProxyBean::Custom(_) => None,
        }
    }

    /// The real destination this bean dials when it is the terminal hop.
    ///
    /// For port-spec protocols this resolves one dialable port (hopping
    /// specs pick uniformly, matching the worker's own behavior). Returns
    /// `None` for structural beans and unparseable addresses; the
    /// compiler validates specs properly before relying on this.
    pub fn server_location(&self) -> Option<NetLocation> {
        let port = match self {
            ProxyBean::Socks(b) => b.port,
            ProxyBean::Http(b) => b.port,
            ProxyBean::Shadowsocks(b) => b.port,
            ProxyBean::ShadowsocksR(b) => b.port,
            ProxyBean::Vmess(b) => b.port,
            ProxyBean::Vless(b) => b.port,
            ProxyBean::Trojan(b) => b.port,
            ProxyBean::TrojanGo(b) => b.port,
            ProxyBean::Naive(b) => b.port,
            ProxyBean::Brook(b) => b.port,
            ProxyBean::Hysteria(b) => PortSpec::parse(&b.ports).ok()?.dial_port(),
            ProxyBean::Hysteria2(b) => PortSpec::parse(&b.ports).ok()?.dial_port(),
            ProxyBean::Mieru(b) => b.port,
            ProxyBean::Tuic(b) => b.port,
            ProxyBean::Tuic5(b) => b.port,
            ProxyBean::ShadowTls(b) => b.port,
            ProxyBean::Juicity(b) => b.port,
            ProxyBean::Ssh(b) => b.port,
            ProxyBean::Wireguard(b) => b.port,
            ProxyBean::Chain(_) | ProxyBean::Balancer(_) | ProxyBean::Custom(_) => return None,
        };
        NetLocation::from_str(self.server_host()?, Some(port)).ok()
    }

    /// Whether this bean may appear as a non-terminal chain hop.
    ///
    /// Port hopping and faketcp encapsulation bypass the loopback
    /// forwarding a chain needs, so those configurations only work as a
    /// terminal hop of length-1 chains.
    pub fn supports_chaining(&self) -> bool {
        match self {
            ProxyBean::Hysteria(b) => {
                b.protocol == HysteriaProtocol::Udp
                    && !PortSpec::parse(&b.ports).map(|s| s.is_multi()).unwrap_or(false)
            }
            ProxyBean::Hysteria2(b) => {
                !(b.port_hopping
                    && PortSpec::parse(&b.ports).map(|s| s.is_multi()).unwrap_or(false))
            }
            ProxyBean::Chain(_) | ProxyBean::Balancer(_) => false,
            _ => true,
        }
    }
}
