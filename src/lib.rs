//! laces - proxy chain compilation and process orchestration.
//!
//! laces turns a declarative proxy profile selection - a single hop, an
//! ordered chain, or a balancer group - into a running local network
//! topology: one loopback listening port per hop, each backed either by an
//! outbound merged into the tunneling engine's aggregate config, or by a
//! spawned worker process driven by a generated config artifact.
//!
//! # Session lifecycle
//!
//! ```text
//! profile graph -> resolve() -> compile() -> decide() -> spawn workers
//!                  (topology)   (artifacts)  (launch       + load engine
//!                                             plans)
//! ```
//!
//! Startup is all-or-nothing: a failure compiling or launching any hop
//! rolls back everything already started (workers killed, side files
//! deleted, reserved ports released) before the error is surfaced. Once
//! running, an unexpected worker exit is session-fatal and takes the same
//! teardown path.
//!
//! The TUN packet engine itself is an external collaborator, consumed
//! through the [`engine`] interfaces: it receives the aggregate config,
//! the TUN file descriptor, a raw-socket protect callback, and a DNS
//! override hook.

mod address;
mod option_util;
mod port_spec;

pub mod assemble;
pub mod bean;
pub mod compile;
pub mod engine;
pub mod error;
pub mod launch;
pub mod link;
pub mod session;
pub mod store;
pub mod supervise;
pub mod topology;

pub use address::{Address, NetLocation};
pub use error::OrchestrateError;
pub use port_spec::PortSpec;
pub use session::{RunningSession, SessionOptions};

/// Loopback address every hop listens on.
pub const LOCALHOST: &str = "127.0.0.1";
