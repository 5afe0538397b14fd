//! Interfaces to the tunneling engine and its platform collaborators.
//!
//! The packet engine itself lives outside this crate: it receives the
//! aggregate config, the TUN file descriptor, and the platform callbacks,
//! and moves packets until stopped. Everything here is the contract the
//! orchestrator drives it through, plus no-op implementations for tests
//! and dry runs.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::assemble::EngineConfig;

/// Raw TUN file descriptor handed in by the platform (e.g. a VPN
/// service's establish call).
pub type TunFd = i32;

/// Socket protection callback.
///
/// Under a system VPN, outbound sockets to the proxy servers would be
/// routed back into the tunnel; the platform exempts a socket from VPN
/// routing when this is invoked with its fd. A no-op implementation is
/// used on platforms without that loop.
pub trait SocketProtector: Send + Sync {
    fn protect(&self, fd: i32) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct NoOpSocketProtector;

impl SocketProtector for NoOpSocketProtector {
    fn protect(&self, _fd: i32) -> io::Result<()> {
        Ok(())
    }
}

/// A socket protector wrapping a callback, for FFI-provided functions.
pub struct FnSocketProtector<F> {
    protect_fn: F,
}

impl<F> FnSocketProtector<F>
where
    F: Fn(i32) -> io::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { protect_fn: f }
    }
}

impl<F> SocketProtector for FnSocketProtector<F>
where
    F: Fn(i32) -> io::Result<()> + Send + Sync,
{
    fn protect(&self, fd: i32) -> io::Result<()> {
        (self.protect_fn)(fd)
    }
}

/// DNS resolver override: when present, the engine resolves through
/// these servers instead of the system configuration.
pub trait DnsOverride: Send + Sync {
    fn servers(&self) -> Vec<String>;
}

/// Callbacks the engine uses to report back to the session owner.
pub trait EngineEvents: Send + Sync {
    /// A fatal engine-side error; the session owner is expected to tear
    /// the whole session down.
    fn on_fatal(&self, reason: String);

    fn on_traffic(&self, _upload_bytes: u64, _download_bytes: u64) {}
}

/// Default event sink that just logs.
#[derive(Debug, Clone, Default)]
pub struct LogEngineEvents;

impl EngineEvents for LogEngineEvents {
    fn on_fatal(&self, reason: String) {
        log::error!("Engine fatal error: {reason}");
    }
}

/// Runtime objects handed to the engine alongside the aggregate config.
pub struct EngineContext {
    pub tun_fd: Option<TunFd>,
    pub protector: Arc<dyn SocketProtector>,
    pub dns_override: Option<Arc<dyn DnsOverride>>,
    pub events: Arc<dyn EngineEvents>,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            tun_fd: None,
            protector: Arc::new(NoOpSocketProtector),
            dns_override: None,
            events: Arc::new(LogEngineEvents),
        }
    }
}

/// The tunneling engine lifecycle driven by a session.
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    /// Loads the aggregate config. Called exactly once before `start`.
    async fn load(&mut self, config: &EngineConfig, context: &EngineContext) -> io::Result<()>;

    async fn start(&mut self) -> io::Result<()>;

    /// Stops packet processing. Must be safe to call without a prior
    /// successful `start`.
    async fn stop(&mut self);

    /// Creates an independent engine instance for a nested session
    /// (custom config hops).
    fn spawn_instance(&self) -> Box<dyn TunnelEngine>;
}

/// Engine stand-in for dry runs and tests: records what it was given.
#[derive(Debug, Default)]
pub struct NoOpEngine {
    pub loaded_config: Option<String>,
    pub started: bool,
}

impl NoOpEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TunnelEngine for NoOpEngine {
    async fn load(&mut self, config: &EngineConfig, context: &EngineContext) -> io::Result<()> {
        debug!(
            "NoOpEngine loaded config (tun_fd: {:?}, dns override: {})",
            context.tun_fd,
            context.dns_override.is_some()
        );
        self.loaded_config = Some(String::from_utf8_lossy(&config.to_json()?).into_owned());
        Ok(())
    }

    async fn start(&mut self) -> io::Result<()> {
        if self.loaded_config.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "start called before load",
            ));
        }
        info!("NoOpEngine started");
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) {
        self.started = false;
    }

    fn spawn_instance(&self) -> Box<dyn TunnelEngine> {
        Box::new(NoOpEngine::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_socket_protector() {
        let protector = FnSocketProtector::new(|fd| {
            if fd >= 0 {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::InvalidInput, "bad fd"))
            }
        });
        assert!(protector.protect(3).is_ok());
        assert!(protector.protect(-1).is_err());
    }

    #[tokio::test]
    async fn test_noop_engine_requires_load() {
        let mut engine = NoOpEngine::new();
        assert!(engine.start().await.is_err());
    }
}
