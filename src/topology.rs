//! Topology resolution: expands a selected profile into a flat, ordered
//! list of compiled hops with pre-allocated loopback ports.
//!
//! Validation (cycles, unresolved references, empty groups, chain
//! compatibility) happens strictly before any port is reserved, so a
//! failed resolve never holds kernel resources. Reservations are real
//! bound listeners held until just before the owning worker is spawned,
//! closing the window where another process could take the port.

use std::collections::HashSet;

use log::debug;

use crate::bean::{ProfileNode, ProxyBean};
use crate::error::{OrchestrateError, Result};
use crate::store::ProfileStore;

/// A loopback port held by a bound listener until the real owner binds it.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    listener: Option<std::net::TcpListener>,
}

impl PortReservation {
    pub fn bind() -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            port,
            listener: Some(listener),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Drops the placeholder listener so the worker can bind the port.
    pub fn release(&mut self) {
        self.listener.take();
    }

    pub fn is_held(&self) -> bool {
        self.listener.is_some()
    }
}

/// One resolved hop, alive for the duration of a single session.
#[derive(Debug)]
pub struct CompiledHop {
    pub node: ProfileNode,
    pub is_balancer_member: bool,
    pub position: usize,
    pub is_last: bool,
    reservation: PortReservation,
}

impl CompiledHop {
    pub fn local_port(&self) -> u16 {
        self.reservation.port()
    }

    pub fn release_port(&mut self) {
        self.reservation.release()
    }

    /// "hop 2 (Hysteria2)" style label for logs and failure reasons.
    pub fn describe(&self) -> String {
        format!(
            "hop {} ({})",
            self.position + 1,
            self.node.bean.protocol_name()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    Single,
    Chain,
    Balancer,
}

#[derive(Debug)]
pub struct ResolvedTopology {
    pub kind: TopologyKind,
    pub hops: Vec<CompiledHop>,
    /// The balancer's externally-visible shared port.
    shared: Option<PortReservation>,
}

impl ResolvedTopology {
    pub fn shared_port(&self) -> Option<u16> {
        self.shared.as_ref().map(|r| r.port())
    }

    pub fn release_shared_port(&mut self) {
        if let Some(shared) = self.shared.as_mut() {
            shared.release();
        }
    }

    /// The port the engine's outbound should dial: the shared balancer
    /// port when present, otherwise the first hop's port.
    pub fn entry_port(&self) -> Option<u16> {
        match self.shared_port() {
            Some(port) => Some(port),
            None => self.hops.first().map(|hop| hop.local_port()),
        }
    }
}

/// Expands `root` into an ordered hop list, assigning one local port per
/// hop (plus the shared port for a balancer).
pub fn resolve(store: &dyn ProfileStore, root: &ProfileNode) -> Result<ResolvedTopology> {
    let (kind, nodes) = expand(store, root)?;

    // Validation is complete; only now touch the port namespace.
    let mut hops = Vec::with_capacity(nodes.len());
    let last_index = nodes.len() - 1;
    let is_balancer = kind == TopologyKind::Balancer;
    for (position, node) in nodes.into_iter().enumerate() {
        let reservation = PortReservation::bind()
            .map_err(|source| OrchestrateError::PortAllocation { source })?;
        debug!(
            "Assigned local port {} to {} (position {})",
            reservation.port(),
            node.label(),
            position
        );
        hops.push(CompiledHop {
            node,
            is_balancer_member: is_balancer,
            position,
            // Balancer members are independent length-1 chains.
            is_last: is_balancer || position == last_index,
            reservation,
        });
    }

    let shared = if is_balancer {
        let reservation = PortReservation::bind()
            .map_err(|source| OrchestrateError::PortAllocation { source })?;
        debug!("Assigned shared balancer port {}", reservation.port());
        Some(reservation)
    } else {
        None
    };

    Ok(ResolvedTopology { kind, hops, shared })
}

/// Pure expansion and validation; allocates nothing.
fn expand(
    store: &dyn ProfileStore,
    root: &ProfileNode,
) -> Result<(TopologyKind, Vec<ProfileNode>)> {
    match &root.bean {
        ProxyBean::Chain(chain) => {
            if chain.proxies.is_empty() {
                return Err(OrchestrateError::EmptyGroup { id: root.id });
            }
            let mut seen = HashSet::new();
            seen.insert(root.id);
            let mut nodes = Vec::with_capacity(chain.proxies.len());
            collect_chain_members(store, &chain.proxies, &mut seen, &mut nodes, true)?;
            let last_index = nodes.len() - 1;
            for (index, node) in nodes.iter().enumerate() {
                if index != last_index && !node.bean.supports_chaining() {
                    return Err(OrchestrateError::IncompatibleMember {
                        id: node.id,
                        reason: format!(
                            "{} cannot forward to a following hop",
                            node.bean.protocol_name()
                        ),
                    });
                }
            }
            Ok((TopologyKind::Chain, nodes))
        }
        ProxyBean::Balancer(balancer) => {
            if balancer.proxies.is_empty() {
                return Err(OrchestrateError::EmptyGroup { id: root.id });
            }
            let mut nodes = Vec::with_capacity(balancer.proxies.len());
            for member_id in balancer.proxies.iter() {
                if *member_id == root.id {
                    return Err(OrchestrateError::Cycle { id: root.id });
                }
                let member = store
                    .get_node(*member_id)
                    .ok_or(OrchestrateError::UnresolvedReference { id: *member_id })?;
                if member.bean.is_group() {
                    return Err(OrchestrateError::IncompatibleMember {
                        id: *member_id,
                        reason: format!(
                            "{} is not allowed inside a balancer",
                            member.bean.protocol_name()
                        ),
                    });
                }
                nodes.push(member.clone());
            }
            Ok((TopologyKind::Balancer, nodes))
        }
        _ => Ok((TopologyKind::Single, vec![root.clone()])),
    }
}

/// Gathers chain members in hop order, flattening nested chains one
/// level. `allow_nested` is false inside an already-nested chain.
fn collect_chain_members(
    store: &dyn ProfileStore,
    member_ids: &[u64],
    seen: &mut HashSet<u64>,
    nodes: &mut Vec<ProfileNode>,
    allow_nested: bool,
) -> Result<()> {
    for member_id in member_ids.iter() {
        if !seen.insert(*member_id) {
            return Err(OrchestrateError::Cycle { id: *member_id });
        }
        let member = store
            .get_node(*member_id)
            .ok_or(OrchestrateError::UnresolvedReference { id: *member_id })?;
        match &member.bean {
            ProxyBean::Chain(nested) => {
                if !allow_nested {
                    return Err(OrchestrateError::IncompatibleMember {
                        id: *member_id,
                        reason: "chains may only be nested one level deep".to_string(),
                    });
                }
                if nested.proxies.is_empty() {
                    return Err(OrchestrateError::EmptyGroup { id: *member_id });
                }
                collect_chain_members(store, &nested.proxies, seen, nodes, false)?;
            }
            ProxyBean::Balancer(_) => {
                return Err(OrchestrateError::IncompatibleMember {
                    id: *member_id,
                    reason: "balancers are not allowed inside a chain".to_string(),
                });
            }
            _ => {
                nodes.push(member.clone());
            }
        }
    }
    Ok(())
}
