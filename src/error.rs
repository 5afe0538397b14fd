//! Error taxonomy for session orchestration.
//!
//! Every error carries enough context to name the failing hop and failure
//! kind, so the session owner can surface a specific reason instead of a
//! generic failure message.

use std::path::PathBuf;

use thiserror::Error;

use crate::bean::ProfileId;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    /// A chain or balancer transitively references itself.
    #[error("profile group contains a cycle through profile {id}")]
    Cycle { id: ProfileId },

    /// A group member id has no backing profile in the store.
    #[error("profile {id} is referenced but does not exist")]
    UnresolvedReference { id: ProfileId },

    /// A chain or balancer with zero members.
    #[error("profile group {id} has no members")]
    EmptyGroup { id: ProfileId },

    /// A group member that cannot appear at that position, e.g. a balancer
    /// nested inside a balancer, or a port-hopping hop in mid-chain.
    #[error("profile {id} is incompatible here: {reason}")]
    IncompatibleMember { id: ProfileId, reason: String },

    /// A port list/range spec ("443", "443,8443", "2000-3000") failed
    /// validation.
    #[error("invalid port spec {spec:?}: {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    /// The protocol cannot be launched in any mode at this position.
    #[error("hop {hop} ({protocol}): protocol is not supported here")]
    UnsupportedProtocol { hop: usize, protocol: &'static str },

    /// Reserving a loopback listening port failed.
    #[error("failed to reserve a local port: {source}")]
    PortAllocation {
        #[source]
        source: std::io::Error,
    },

    /// Writing a config artifact or CA side file failed.
    #[error("failed to write {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Spawning a worker binary failed (missing, not executable, ...).
    #[error("worker for hop {hop} ({protocol}) failed to start: {source}")]
    Spawn {
        hop: usize,
        protocol: String,
        #[source]
        source: std::io::Error,
    },

    /// A worker exited while the session was still active.
    #[error("worker for hop {hop} ({protocol}) exited unexpectedly with {status}")]
    WorkerExited {
        hop: usize,
        protocol: String,
        status: String,
    },

    /// The tunneling engine rejected the aggregate config or failed to
    /// start.
    #[error("tunneling engine failed: {source}")]
    Engine {
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, OrchestrateError>;
