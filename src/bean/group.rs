//! Structural beans: chain, balancer, and custom (opaque) outbounds.

use serde::{Deserialize, Serialize};

use super::ProfileId;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChainBean {
    /// Hop profile ids, entry first; the last hop dials the real
    /// destination.
    pub proxies: Vec<ProfileId>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancerStrategy {
    #[default]
    RoundRobin,
    LeastPing,
}

fn default_probe_interval() -> u32 {
    60
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BalancerBean {
    /// Member profile ids; each is an independent terminal hop sharing
    /// the balancer's externally-visible port.
    pub proxies: Vec<ProfileId>,
    #[serde(default)]
    pub strategy: BalancerStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,
    #[serde(default = "default_probe_interval")]
    pub probe_interval: u32,
}

/// Raw outbound JSON merged into the aggregate engine config verbatim.
pub const CUSTOM_KIND_ENGINE_OUTBOUND: &str = "engine_outbound";

/// An opaque custom outbound. `engine_outbound` content is merged into
/// the aggregate config; any other kind is handed to a nested engine
/// instance bound to the hop's local port.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomBean {
    pub kind: String,
    pub content: String,
}

impl CustomBean {
    pub fn is_engine_outbound(&self) -> bool {
        self.kind == CUSTOM_KIND_ENGINE_OUTBOUND
    }
}
