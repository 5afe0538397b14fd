//! Config artifact compilation.
//!
//! For every hop that runs as an external worker, the compiler produces
//! the configuration document that worker expects - JSON for most,
//! YAML for the hysteria2 family - plus any side files (CA certificates)
//! that must be deleted on teardown. Artifacts are structured documents
//! serialized at the boundary; no hand-concatenated config text.
//!
//! Compilation never spawns anything and writes nothing on failure: a
//! hop with an invalid port spec fails before its CA side file would be
//! created.

mod hysteria;
mod juicity;
mod mieru;
mod naive;
mod trojan_go;
mod tuic;

use std::path::{Path, PathBuf};

use crate::address::NetLocation;
use crate::bean::ProxyBean;
use crate::error::{OrchestrateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Yaml,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::Yaml => "yaml",
        }
    }
}

/// A compiled worker configuration plus the side files written for it.
#[derive(Debug)]
pub struct ConfigArtifact {
    pub format: ArtifactFormat,
    pub bytes: Vec<u8>,
    pub side_files: Vec<PathBuf>,
}

/// Inputs for compiling one hop.
#[derive(Debug)]
pub struct CompileContext<'a> {
    /// Session-private directory for artifacts and side files.
    pub cache_dir: &'a Path,
    /// The loopback port this hop listens on.
    pub local_port: u16,
    /// What the worker dials: the next hop's loopback address when
    /// chained, otherwise the bean's own server.
    pub upstream: &'a NetLocation,
    /// True when `upstream` is the next hop rather than the real server.
    pub chained: bool,
    /// Embed a mux block (last hop and balancer members only).
    pub enable_mux: bool,
    /// Verbose worker logging.
    pub verbose: bool,
    /// fd-control socket path for QUIC workers that must protect their
    /// sockets from VPN routing; None outside system-TUN sessions.
    pub protect_path: Option<&'a str>,
}

/// Compiles the artifact for one hop's bean. Returns `None` for hops
/// that need no config document: in-process protocols, and workers
/// configured purely through argv (brook, shadowtls).
pub fn compile(bean: &ProxyBean, ctx: &CompileContext) -> Result<Option<ConfigArtifact>> {
    match bean {
        ProxyBean::TrojanGo(bean) => trojan_go::build(bean, ctx).map(Some),
        ProxyBean::Naive(bean) => naive::build(bean, ctx).map(Some),
        ProxyBean::Hysteria(bean) => hysteria::build_v1(bean, ctx).map(Some),
        ProxyBean::Hysteria2(bean) => hysteria::build_v2(bean, ctx).map(Some),
        ProxyBean::Mieru(bean) => mieru::build(bean, ctx).map(Some),
        ProxyBean::Tuic(bean) => tuic::build_v4(bean, ctx).map(Some),
        ProxyBean::Tuic5(bean) => tuic::build_v5(bean, ctx).map(Some),
        ProxyBean::Juicity(bean) => juicity::build(bean, ctx).map(Some),

        // Configured through argv alone.
        ProxyBean::Brook(_) | ProxyBean::ShadowTls(_) => Ok(None),

        // Merged into the aggregate engine config instead.
        ProxyBean::Socks(_)
        | ProxyBean::Http(_)
        | ProxyBean::Shadowsocks(_)
        | ProxyBean::ShadowsocksR(_)
        | ProxyBean::Vmess(_)
        | ProxyBean::Vless(_)
        | ProxyBean::Trojan(_)
        | ProxyBean::Ssh(_)
        | ProxyBean::Wireguard(_)
        | ProxyBean::Custom(_) => Ok(None),

        ProxyBean::Chain(_) | ProxyBean::Balancer(_) => Ok(None),
    }
}

/// Writes the artifact document itself into the cache dir, returning its
/// path. The path is recorded by the session for teardown alongside the
/// artifact's side files.
pub fn write_artifact(
    ctx: &CompileContext,
    stem: &str,
    artifact: &ConfigArtifact,
) -> Result<PathBuf> {
    let file_name = format!(
        "{}_{}.{}",
        stem,
        ctx.local_port,
        artifact.format.extension()
    );
    write_cache_file(ctx.cache_dir, &file_name, &artifact.bytes)
}

/// Writes a CA side file, recording its path in `side_files`.
pub(crate) fn write_ca_file(
    ctx: &CompileContext,
    stem: &str,
    ca_text: &str,
    side_files: &mut Vec<PathBuf>,
) -> Result<PathBuf> {
    let file_name = format!("{}_{}.ca", stem, ctx.local_port);
    let path = write_cache_file(ctx.cache_dir, &file_name, ca_text.as_bytes())?;
    side_files.push(path.clone());
    Ok(path)
}

fn write_cache_file(cache_dir: &Path, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir).map_err(|source| OrchestrateError::ConfigWrite {
        path: cache_dir.to_path_buf(),
        source,
    })?;
    let path = cache_dir.join(file_name);
    std::fs::write(&path, contents).map_err(|source| OrchestrateError::ConfigWrite {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// The SNI to present: the bean's explicit value, else the server host
/// when it is a name (IP literals make poor SNI values).
pub(crate) fn sni_or_host<'a>(sni: &'a Option<String>, server: &'a str) -> Option<&'a str> {
    match sni.as_deref() {
        Some(value) if !value.is_empty() => Some(value),
        _ => {
            if crate::address::Address::from(server)
                .map(|a| a.is_ip())
                .unwrap_or(false)
            {
                None
            } else {
                Some(server)
            }
        }
    }
}

pub(crate) fn to_pretty_json(value: &serde_json::Value) -> Vec<u8> {
    // Valid JSON values cannot fail to serialize.
    let mut bytes = serde_json::to_vec_pretty(value).unwrap_or_default();
    bytes.push(b'\n');
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::ProfileNode;

    fn ctx_in<'a>(
        dir: &'a Path,
        upstream: &'a NetLocation,
        chained: bool,
    ) -> CompileContext<'a> {
        CompileContext {
            cache_dir: dir,
            local_port: 14000,
            upstream,
            chained,
            enable_mux: false,
            verbose: false,
            protect_path: None,
        }
    }

    fn bean(yaml: &str) -> ProxyBean {
        serde_yaml::from_str::<ProfileNode>(yaml).unwrap().bean
    }

    #[test]
    fn test_in_process_protocols_compile_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let ctx = ctx_in(dir.path(), &upstream, false);
        let vmess = bean(
            "id: 1\ntype: vmess\nserver: example.com\nport: 443\nuser_id: b0e80a62-8a51-47f0-91f1-f0f7faf8d9d4",
        );
        assert!(compile(&vmess, &ctx).unwrap().is_none());
    }

    #[test]
    fn test_argv_only_workers_compile_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let ctx = ctx_in(dir.path(), &upstream, false);
        let brook = bean("id: 1\ntype: brook\nserver: example.com\nport: 9999\npassword: pw");
        assert!(compile(&brook, &ctx).unwrap().is_none());
    }

    #[test]
    fn test_invalid_port_spec_aborts_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let ctx = ctx_in(dir.path(), &upstream, false);
        // CA text present: a side file would be written if compilation
        // got that far.
        let hy2 = bean(
            "id: 1\ntype: hysteria2\nserver: example.com\nports: \"2000-1000\"\nca: |\n  FAKE PEM\n",
        );
        let err = compile(&hy2, &ctx).unwrap_err();
        assert!(matches!(err, OrchestrateError::InvalidPortSpec { .. }));
        assert_eq!(
            std::fs::read_dir(dir.path()).unwrap().count(),
            0,
            "no side files may be written for a failed compile"
        );
    }

    #[test]
    fn test_write_artifact_names_by_port_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = NetLocation::from_str("example.com:443", None).unwrap();
        let ctx = ctx_in(dir.path(), &upstream, false);
        let artifact = ConfigArtifact {
            format: ArtifactFormat::Json,
            bytes: b"{}".to_vec(),
            side_files: vec![],
        };
        let path = write_artifact(&ctx, "naive", &artifact).unwrap();
        assert_eq!(path.file_name().unwrap(), "naive_14000.json");
        assert!(path.exists());
    }

    #[test]
    fn test_sni_or_host() {
        assert_eq!(
            sni_or_host(&Some("sni.example.com".to_string()), "1.2.3.4"),
            Some("sni.example.com")
        );
        assert_eq!(sni_or_host(&None, "server.example.com"), Some("server.example.com"));
        assert_eq!(sni_or_host(&None, "1.2.3.4"), None);
    }
}
