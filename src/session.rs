//! Session lifecycle: compiles the selected profile into a running
//! topology, supervises it, and tears everything down exactly once.
//!
//! A [`RunningSession`] is an explicit owned object; there is no global
//! "current session" state. Startup is all-or-nothing: every hop is
//! compiled and validated before the first worker is spawned, and any
//! later failure rolls back already-spawned workers and already-written
//! side files before the error is returned.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::LOCALHOST;
use crate::address::NetLocation;
use crate::assemble::{self, AssembleOptions, EngineConfig};
use crate::bean::{ProfileNode, ProxyBean};
use crate::compile::{self, CompileContext};
use crate::engine::{EngineContext, TunnelEngine};
use crate::error::{OrchestrateError, Result};
use crate::launch::{self, LaunchMode, LaunchPlan, RuntimeFlags, WorkerKind};
use crate::store::{MemoryProfileStore, ProfileFile, ProfileStore};
use crate::supervise::{ProcessPool, WorkerEvent, WorkerSpec};
use crate::topology::{self, ResolvedTopology};

/// How the hop that carries this app's own traffic is treated. The exact
/// flag combination in upstream implementations encodes OS-version
/// quirks; here it is explicit policy, not inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelfTrafficPolicy {
    /// The orchestrator's own sockets bypass the tunnel (default).
    #[default]
    BypassSelf,
    /// Self traffic is routed like everything else; workers rely on the
    /// protect callback to escape the loop.
    IncludeSelf,
}

fn default_socks_port() -> u16 {
    2080
}

fn default_grace_ms() -> u64 {
    500
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("laces")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Session-private directory for artifacts and side files. Only
    /// files this session created are deleted on teardown.
    pub cache_dir: PathBuf,
    /// Directory searched for worker binaries before PATH.
    pub worker_dir: Option<PathBuf>,
    /// The engine's local SOCKS entry port.
    pub socks_port: u16,
    pub enable_mux: bool,
    pub verbose_worker_logs: bool,
    /// Use the OS trust store for workers; when false,
    /// `trust_anchor_file` is exported through the TLS override pair.
    pub system_trust_store: bool,
    pub trust_anchor_file: Option<PathBuf>,
    /// Run hysteria2 hops through the engine where possible instead of
    /// spawning the worker.
    pub hysteria2_in_engine: bool,
    /// The session runs under a system TUN device.
    pub under_system_tun: bool,
    pub self_traffic: SelfTrafficPolicy,
    /// DNS servers the engine resolves through; empty keeps the system
    /// resolver.
    pub dns_servers: Vec<String>,
    /// Grace period before a stopping worker is force-killed.
    pub worker_grace_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            worker_dir: None,
            socks_port: default_socks_port(),
            enable_mux: false,
            verbose_worker_logs: false,
            system_trust_store: true,
            trust_anchor_file: None,
            hysteria2_in_engine: false,
            under_system_tun: false,
            self_traffic: SelfTrafficPolicy::default(),
            dns_servers: vec![],
            worker_grace_ms: default_grace_ms(),
        }
    }
}

impl SessionOptions {
    fn runtime_flags(&self) -> RuntimeFlags {
        RuntimeFlags {
            enable_mux: self.enable_mux,
            verbose_worker_logs: self.verbose_worker_logs,
            system_trust_store: self.system_trust_store,
            trust_anchor_file: self.trust_anchor_file.clone(),
            hysteria2_in_engine: self.hysteria2_in_engine,
            under_system_tun: self.under_system_tun,
        }
    }

    fn assemble_options(&self) -> AssembleOptions {
        AssembleOptions {
            socks_port: self.socks_port,
            enable_mux: self.enable_mux,
            verbose: self.verbose_worker_logs,
            dns_servers: self.dns_servers.clone(),
            ..Default::default()
        }
    }
}

/// A worker that has been planned but not yet spawned.
struct PendingWorker {
    hop_index: usize,
    tag: String,
    protocol: &'static str,
    plan: LaunchPlan,
}

/// Everything compiled and validated, nothing spawned yet.
struct CompiledSession {
    topology: ResolvedTopology,
    side_files: Vec<PathBuf>,
    pending: Vec<PendingWorker>,
    nested_pending: Vec<(usize, String, u16)>,
    requires_protect: bool,
    engine_config: EngineConfig,
}

/// Phase 1: resolve the topology and compile every hop. On any failure
/// the side files written so far are swept before the error returns, so
/// a failed compile leaves nothing behind.
fn compile_session(
    store: &dyn ProfileStore,
    root: &ProfileNode,
    options: &SessionOptions,
) -> Result<CompiledSession> {
    let flags = options.runtime_flags();
    let topology = topology::resolve(store, root)?;
    info!(
        "Resolved {} into {} hop(s)",
        root.label(),
        topology.hops.len()
    );

    let mut side_files: Vec<PathBuf> = vec![];
    let mut modes = Vec::with_capacity(topology.hops.len());
    let mut pending: Vec<PendingWorker> = vec![];
    let mut nested_pending: Vec<(usize, String, u16)> = vec![];
    let mut requires_protect = false;

    let result = (|| -> Result<()> {
        for index in 0..topology.hops.len() {
            let (upstream, chained) = hop_upstream(&topology, index);
            let hop = &topology.hops[index];
            let bean = &hop.node.bean;
            let mode = launch::launch_mode(bean, &flags);
            modes.push(mode);

            let protect_path = if flags.under_system_tun {
                Some("protect_path")
            } else {
                None
            };
            let ctx = CompileContext {
                cache_dir: &options.cache_dir,
                local_port: hop.local_port(),
                upstream: &upstream,
                chained,
                enable_mux: options.enable_mux && (hop.is_last || hop.is_balancer_member),
                verbose: options.verbose_worker_logs,
                protect_path,
            };

            let config_path = if mode == LaunchMode::ExternalWorker {
                match compile::compile(bean, &ctx)? {
                    Some(artifact) => {
                        side_files.extend(artifact.side_files.iter().cloned());
                        let path = compile::write_artifact(&ctx, worker_stem(bean), &artifact)?;
                        side_files.push(path.clone());
                        Some(path)
                    }
                    None => None,
                }
            } else {
                None
            };

            let plan = launch::decide(
                hop,
                &upstream,
                config_path.as_deref(),
                &flags,
                options.worker_dir.as_deref(),
            )?;
            requires_protect = requires_protect || plan.requires_protect;

            match plan.mode {
                LaunchMode::ExternalWorker => {
                    pending.push(PendingWorker {
                        hop_index: index,
                        tag: hop.describe(),
                        protocol: bean.protocol_name(),
                        plan,
                    });
                }
                LaunchMode::NestedInstance => {
                    if let ProxyBean::Custom(custom) = bean {
                        nested_pending.push((index, custom.content.clone(), hop.local_port()));
                    }
                }
                LaunchMode::InProcess => {}
            }
        }
        Ok(())
    })();

    if let Err(e) = result {
        sweep_files(&side_files);
        return Err(e);
    }

    let engine_config = match assemble::assemble(root, &topology, &modes, &options.assemble_options())
    {
        Ok(config) => config,
        Err(e) => {
            sweep_files(&side_files);
            return Err(e);
        }
    };

    Ok(CompiledSession {
        topology,
        side_files,
        pending,
        nested_pending,
        requires_protect,
        engine_config,
    })
}

/// A dry run's output: the aggregate config plus one line per hop.
#[derive(Debug)]
pub struct DryRun {
    pub engine_config: EngineConfig,
    pub hop_summaries: Vec<String>,
}

/// Compiles everything, spawns nothing, and sweeps all written files
/// before returning.
pub fn dry_run(
    store: &dyn ProfileStore,
    root: &ProfileNode,
    options: &SessionOptions,
) -> Result<DryRun> {
    let compiled = compile_session(store, root, options)?;

    let mut hop_summaries = Vec::with_capacity(compiled.topology.hops.len());
    for (index, hop) in compiled.topology.hops.iter().enumerate() {
        let summary = if let Some(worker) = compiled
            .pending
            .iter()
            .find(|worker| worker.hop_index == index)
        {
            format!(
                "{} on port {}: worker {:?} {}",
                hop.describe(),
                hop.local_port(),
                worker
                    .plan
                    .program
                    .as_deref()
                    .unwrap_or(std::path::Path::new("?")),
                worker.plan.args.join(" "),
            )
        } else if compiled
            .nested_pending
            .iter()
            .any(|(nested_index, _, _)| *nested_index == index)
        {
            format!(
                "{} on port {}: nested instance",
                hop.describe(),
                hop.local_port()
            )
        } else {
            format!("{} on port {}: in-process", hop.describe(), hop.local_port())
        };
        hop_summaries.push(summary);
    }

    sweep_files(&compiled.side_files);
    Ok(DryRun {
        engine_config: compiled.engine_config,
        hop_summaries,
    })
}

/// A fatal condition observed after a successful start.
#[derive(Debug)]
pub struct SessionFatal {
    pub reason: OrchestrateError,
}

pub struct RunningSession {
    engine: Box<dyn TunnelEngine>,
    pool: ProcessPool,
    events: tokio::sync::mpsc::UnboundedReceiver<WorkerEvent>,
    /// (hop position, protocol name) per pool worker index.
    worker_hops: Vec<(usize, String)>,
    side_files: Vec<PathBuf>,
    nested: Vec<RunningSession>,
    pub engine_config: EngineConfig,
    /// True when any hop needs the raw-socket protect bypass.
    pub requires_protect: bool,
    pub self_traffic: SelfTrafficPolicy,
    stopped: bool,
}

impl std::fmt::Debug for RunningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSession")
            .field("worker_hops", &self.worker_hops)
            .field("side_files", &self.side_files)
            .field("nested", &self.nested)
            .field("engine_config", &self.engine_config)
            .field("requires_protect", &self.requires_protect)
            .field("self_traffic", &self.self_traffic)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl RunningSession {
    /// Compiles, launches, and starts the whole topology for `root`.
    pub async fn start(
        store: &dyn ProfileStore,
        root: &ProfileNode,
        options: &SessionOptions,
        mut engine: Box<dyn TunnelEngine>,
        engine_context: EngineContext,
    ) -> Result<RunningSession> {
        let CompiledSession {
            mut topology,
            side_files,
            pending,
            nested_pending,
            requires_protect,
            engine_config,
        } = compile_session(store, root, options)?;

        // Phase 2: spawn. From here on, every failure path must undo
        // whatever has started.
        let grace = Duration::from_millis(options.worker_grace_ms);
        let (mut pool, events) = ProcessPool::new(grace);
        let mut worker_hops: Vec<(usize, String)> = vec![];

        for worker in pending.into_iter() {
            let program = match worker.plan.program.as_ref() {
                Some(program) => program.clone(),
                None => continue,
            };
            // Hand the reserved port over to the worker.
            topology.hops[worker.hop_index].release_port();
            let spec = WorkerSpec {
                tag: worker.tag.clone(),
                program,
                args: worker.plan.args.clone(),
                env: worker.plan.env.clone(),
            };
            if let Err(source) = pool.start(spec) {
                warn!("Spawn failed for {}, rolling back", worker.tag);
                pool.stop_all().await;
                sweep_files(&side_files);
                return Err(OrchestrateError::Spawn {
                    hop: worker.hop_index + 1,
                    protocol: worker.protocol.to_string(),
                    source,
                });
            }
            worker_hops.push((worker.hop_index, worker.protocol.to_string()));
        }

        // Nested instances: independent copies of this engine, driven by
        // the embedded custom document, listening on the hop's port.
        let mut nested = vec![];
        for (hop_index, content, local_port) in nested_pending.into_iter() {
            topology.hops[hop_index].release_port();
            let child_engine = engine.spawn_instance();
            match start_nested(content, options.clone(), local_port, child_engine).await {
                Ok(child) => nested.push(child),
                Err(e) => {
                    warn!(
                        "Nested instance for hop {} failed, rolling back",
                        hop_index + 1
                    );
                    pool.stop_all().await;
                    for mut child in nested.into_iter() {
                        child.stop().await;
                    }
                    sweep_files(&side_files);
                    return Err(e);
                }
            }
        }

        // The balancer's shared port is bound by the engine.
        topology.release_shared_port();

        if let Err(source) = engine.load(&engine_config, &engine_context).await {
            pool.stop_all().await;
            for child in nested.iter_mut() {
                child.stop().await;
            }
            sweep_files(&side_files);
            return Err(OrchestrateError::Engine { source });
        }
        if let Err(source) = engine.start().await {
            engine.stop().await;
            pool.stop_all().await;
            for child in nested.iter_mut() {
                child.stop().await;
            }
            sweep_files(&side_files);
            return Err(OrchestrateError::Engine { source });
        }

        info!(
            "Session started: {} worker(s), {} nested instance(s), entry port {:?}",
            pool.len(),
            nested.len(),
            topology.entry_port()
        );

        Ok(RunningSession {
            engine,
            pool,
            events,
            worker_hops,
            side_files,
            nested,
            engine_config,
            requires_protect,
            self_traffic: options.self_traffic,
            stopped: false,
        })
    }

    /// Waits for the next session-fatal condition: a worker exiting
    /// while the session is active. Returns `None` once stopped.
    pub async fn next_fatal(&mut self) -> Option<SessionFatal> {
        if self.stopped {
            return None;
        }
        let event = self.events.recv().await?;
        if self.stopped {
            return None;
        }
        let (hop, protocol) = self
            .worker_hops
            .get(event.index)
            .map(|(hop, protocol)| (hop + 1, protocol.clone()))
            .unwrap_or((0, "unknown".to_string()));
        Some(SessionFatal {
            reason: OrchestrateError::WorkerExited {
                hop,
                protocol,
                status: event.status,
            },
        })
    }

    /// Worker states, for diagnostics and tests.
    pub fn worker_states(&self) -> Vec<(String, crate::supervise::WorkerState)> {
        self.pool.states()
    }

    /// Tears the whole session down: engine first, then workers, then
    /// nested instances, then the side-file sweep. Idempotent.
    pub async fn stop(&mut self) {
        self.stop_boxed().await
    }

    fn stop_boxed(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.stopped {
                return;
            }
            self.stopped = true;

            self.engine.stop().await;
            self.pool.stop_all().await;
            for child in self.nested.iter_mut() {
                child.stop_boxed().await;
            }
            sweep_files(&self.side_files);
            info!("Session stopped");
        })
    }
}

/// What the hop at `index` dials: the next hop's loopback port inside a
/// chain, else the bean's own server.
fn hop_upstream(topology: &ResolvedTopology, index: usize) -> (NetLocation, bool) {
    let hop = &topology.hops[index];
    if !hop.is_last {
        (
            NetLocation::localhost(topology.hops[index + 1].local_port()),
            true,
        )
    } else {
        let location = hop
            .node
            .bean
            .server_location()
            .unwrap_or_else(|| NetLocation::localhost(hop.local_port()));
        (location, false)
    }
}

fn worker_stem(bean: &ProxyBean) -> &'static str {
    match bean {
        ProxyBean::TrojanGo(_) => WorkerKind::TrojanGo.config_stem(),
        ProxyBean::Naive(_) => WorkerKind::Naive.config_stem(),
        ProxyBean::Hysteria(_) => WorkerKind::Hysteria.config_stem(),
        ProxyBean::Hysteria2(_) => WorkerKind::Hysteria2.config_stem(),
        ProxyBean::Mieru(_) => WorkerKind::Mieru.config_stem(),
        ProxyBean::Tuic(_) => WorkerKind::Tuic.config_stem(),
        ProxyBean::Tuic5(_) => WorkerKind::Tuic5.config_stem(),
        ProxyBean::Juicity(_) => WorkerKind::Juicity.config_stem(),
        _ => "artifact",
    }
}

/// Deletes exactly the files this session created.
fn sweep_files(paths: &[PathBuf]) {
    for path in paths.iter() {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {e}", path.display()),
        }
    }
}

/// The nested custom document: profiles plus a selection, like the
/// top-level profile file but bound to the parent hop's port.
fn start_nested(
    content: String,
    mut options: SessionOptions,
    local_port: u16,
    engine: Box<dyn TunnelEngine>,
) -> Pin<Box<dyn Future<Output = Result<RunningSession>> + Send>> {
    Box::pin(async move {
        let document: ProfileFile = serde_yaml::from_str(&content).map_err(|e| {
            OrchestrateError::IncompatibleMember {
                id: 0,
                reason: format!("invalid nested config document: {e}"),
            }
        })?;
        let selected = document.selected;
        let store = MemoryProfileStore::from_nodes(document.profiles);
        let root = store
            .get_node(selected)
            .ok_or(OrchestrateError::UnresolvedReference { id: selected })?
            .clone();

        // The nested engine's entry is the parent hop's assigned port.
        options.socks_port = local_port;
        debug!("Starting nested instance on {LOCALHOST}:{local_port}");
        RunningSession::start(&store, &root, &options, engine, EngineContext::default()).await
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::NoOpEngine;
    use std::os::unix::fs::PermissionsExt;

    fn write_worker_script(dir: &std::path::Path, name: &str) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();
    }

    fn test_options(cache: &std::path::Path, workers: Option<&std::path::Path>) -> SessionOptions {
        SessionOptions {
            cache_dir: cache.to_path_buf(),
            worker_dir: workers.map(|p| p.to_path_buf()),
            ..Default::default()
        }
    }

    fn node(yaml: &str) -> ProfileNode {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_chain_upstream_derivation() {
        let store = MemoryProfileStore::from_nodes([
            node("id: 1\ntype: socks\nserver: 10.0.0.1\nport: 1080"),
            node("id: 2\ntype: socks\nserver: 10.0.0.2\nport: 1080"),
            node("id: 3\ntype: trojan\nserver: exit.example.com\nport: 443\npassword: pw"),
        ]);
        let root = node("id: 10\ntype: chain\nproxies: [1, 2, 3]");
        let topology = crate::topology::resolve(&store, &root).unwrap();

        // Hops before the last dial the next hop's loopback port.
        for index in 0..2 {
            let (upstream, chained) = hop_upstream(&topology, index);
            assert!(chained);
            assert_eq!(
                upstream,
                NetLocation::localhost(topology.hops[index + 1].local_port())
            );
        }

        // The terminal hop dials the real destination.
        let (upstream, chained) = hop_upstream(&topology, 2);
        assert!(!chained);
        assert_eq!(upstream.to_string(), "exit.example.com:443");
    }

    #[tokio::test]
    async fn test_start_stop_in_process_only() {
        let cache = tempfile::tempdir().unwrap();
        let store = MemoryProfileStore::new();
        let root = node("id: 1\ntype: socks\nserver: 10.0.0.1\nport: 1080");
        let options = test_options(cache.path(), None);

        let mut session = RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        .unwrap();

        assert!(session.engine_config.outbound("proxy").is_some());
        assert!(!session.requires_protect);
        session.stop().await;
        // Second stop is a no-op.
        session.stop().await;
    }

    #[tokio::test]
    async fn test_start_with_worker_and_sweep() {
        let cache = tempfile::tempdir().unwrap();
        let workers = tempfile::tempdir().unwrap();
        write_worker_script(workers.path(), "naive");

        let store = MemoryProfileStore::new();
        let root = node("id: 1\ntype: naive\nserver: example.com\nport: 443");
        let options = test_options(cache.path(), Some(workers.path()));

        let mut session = RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        .unwrap();

        // The artifact exists while the session runs.
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 1);
        let states = session.worker_states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].1, crate::supervise::WorkerState::Running);

        session.stop().await;
        assert_eq!(
            std::fs::read_dir(cache.path()).unwrap().count(),
            0,
            "session files are swept on stop"
        );
        for (_, state) in session.worker_states() {
            assert!(state.is_terminal());
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_rolls_back_earlier_hops() {
        let cache = tempfile::tempdir().unwrap();
        let workers = tempfile::tempdir().unwrap();
        // Hops 1 and 2 have worker binaries; hop 3 does not.
        write_worker_script(workers.path(), "naive");
        write_worker_script(workers.path(), "hysteria2");

        let store = MemoryProfileStore::from_nodes([
            node("id: 1\ntype: naive\nserver: a.example.com\nport: 443"),
            node("id: 2\ntype: hysteria2\nserver: b.example.com\nports: \"443\""),
            node("id: 3\ntype: tuic5\nserver: c.example.com\nport: 443\nuuid: u\npassword: p"),
        ]);
        let root = node("id: 10\ntype: chain\nproxies: [1, 2, 3]");
        let options = test_options(cache.path(), Some(workers.path()));

        let err = RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        .unwrap_err();

        match err {
            OrchestrateError::Spawn { hop, protocol, .. } => {
                assert_eq!(hop, 3);
                assert_eq!(protocol, "TUIC v5");
            }
            other => panic!("expected Spawn error, got {other}"),
        }
        assert_eq!(
            std::fs::read_dir(cache.path()).unwrap().count(),
            0,
            "side files from hops 1 and 2 are deleted on rollback"
        );
    }

    #[tokio::test]
    async fn test_compile_failure_sweeps_before_any_spawn() {
        let cache = tempfile::tempdir().unwrap();
        let store = MemoryProfileStore::from_nodes([
            node("id: 1\ntype: naive\nserver: a.example.com\nport: 443"),
            node("id: 2\ntype: hysteria2\nserver: b.example.com\nports: \"70000\""),
        ]);
        let root = node("id: 10\ntype: chain\nproxies: [1, 2]");
        let options = test_options(cache.path(), None);

        let err = RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrchestrateError::InvalidPortSpec { .. }));
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_worker_exit_is_session_fatal() {
        let cache = tempfile::tempdir().unwrap();
        let workers = tempfile::tempdir().unwrap();
        // A worker that dies shortly after starting.
        let path = workers.path().join("naive");
        std::fs::write(&path, "#!/bin/sh\nsleep 0.1\nexit 1\n").unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();

        let store = MemoryProfileStore::new();
        let root = node("id: 1\ntype: naive\nserver: example.com\nport: 443");
        let options = test_options(cache.path(), Some(workers.path()));

        let mut session = RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        .unwrap();

        let fatal = session.next_fatal().await.expect("worker exit is fatal");
        let reason = fatal.reason.to_string();
        assert!(reason.contains("hop 1"), "reason names the hop: {reason}");
        assert!(reason.contains("Naive"), "reason names the protocol: {reason}");
        assert!(reason.contains("code 1"), "reason names the status: {reason}");
        session.stop().await;
    }

    #[tokio::test]
    async fn test_protect_flag_surfaces() {
        let cache = tempfile::tempdir().unwrap();
        let workers = tempfile::tempdir().unwrap();
        write_worker_script(workers.path(), "tuic5");

        let store = MemoryProfileStore::new();
        let root = node("id: 1\ntype: tuic5\nserver: example.com\nport: 443\nuuid: u\npassword: p");
        let mut options = test_options(cache.path(), Some(workers.path()));
        options.under_system_tun = true;

        let mut session = RunningSession::start(
            &store,
            &root,
            &options,
            Box::new(NoOpEngine::new()),
            EngineContext::default(),
        )
        .await
        .unwrap();
        assert!(session.requires_protect);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_dry_run_spawns_nothing_and_sweeps() {
        let cache = tempfile::tempdir().unwrap();
        let store = MemoryProfileStore::from_nodes([
            node("id: 1\ntype: socks\nserver: 10.0.0.1\nport: 1080"),
            node("id: 2\ntype: naive\nserver: example.com\nport: 443"),
        ]);
        let root = node("id: 10\ntype: chain\nproxies: [1, 2]");
        let options = test_options(cache.path(), None);

        let result = dry_run(&store, &root, &options).unwrap();
        assert_eq!(result.hop_summaries.len(), 2);
        assert!(result.hop_summaries[0].contains("in-process"));
        assert!(result.hop_summaries[1].contains("worker"));
        assert_eq!(
            std::fs::read_dir(cache.path()).unwrap().count(),
            0,
            "dry run leaves no files behind"
        );
    }
}
