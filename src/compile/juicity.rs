//! Juicity worker config (JSON).

use serde_json::{Map, Value};

use crate::bean::JuicityBean;
use crate::error::Result;

use super::{ArtifactFormat, CompileContext, ConfigArtifact, sni_or_host, to_pretty_json};

pub fn build(bean: &JuicityBean, ctx: &CompileContext) -> Result<ConfigArtifact> {
    let mut conf = Map::new();
    conf.insert(
        "listen".to_string(),
        format!("127.0.0.1:{}", ctx.local_port).into(),
    );
    conf.insert("server".to_string(), ctx.upstream.to_string().into());
    conf.insert("uuid".to_string(), bean.uuid.as_str().into());
    conf.insert("password".to_string(), bean.password.as_str().into());
    conf.insert(
        "congestion_control".to_string(),
        bean.congestion_control.as_str().into(),
    );
    if let Some(sni) = sni_or_host(&bean.sni, &bean.server) {
        conf.insert("sni".to_string(), sni.into());
    }
    if bean.allow_insecure {
        conf.insert("allow_insecure".to_string(), true.into());
    }
    if let Some(pin) = bean.pinned_certchain_sha256.as_deref() {
        conf.insert("pinned_certchain_sha256".to_string(), pin.into());
    }
    conf.insert(
        "log_level".to_string(),
        if ctx.verbose { "debug" } else { "error" }.into(),
    );

    Ok(ConfigArtifact {
        format: ArtifactFormat::Json,
        bytes: to_pretty_json(&Value::Object(conf)),
        side_files: vec![],
    })
}
