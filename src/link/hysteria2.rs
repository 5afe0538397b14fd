//! hysteria2:// links.
//!
//! Multi-port (hopping) specs do not fit a URL port, so the numeric
//! port is a placeholder (the spec's first port) and the full spec
//! travels in the `mport` query parameter; parsing prefers `mport`.

use crate::bean::{Hysteria2Bean, ProxyBean};
use crate::port_spec::PortSpec;

use super::{ParsedLink, decode, encode, fragment_name, host_str, invalid, query_param};

pub fn parse(link: &str) -> std::io::Result<ParsedLink> {
    let url = url::Url::parse(link).map_err(invalid)?;

    let mut auth = match url.username() {
        "" => None,
        username => Some(decode(username)),
    };
    if let Some(password) = url.password() {
        auth = Some(match auth {
            Some(auth) => format!("{auth}:{}", decode(password)),
            None => decode(password),
        });
    }

    let ports = match query_param(&url, "mport") {
        Some(mport) => mport,
        None => url.port().unwrap_or(443).to_string(),
    };
    // Reject links whose spec would fail compilation later.
    PortSpec::parse(&ports)
        .map_err(|e| invalid(format!("bad port spec: {e}")))?;

    let obfs_password = match query_param(&url, "obfs").as_deref() {
        Some("salamander") => query_param(&url, "obfs-password"),
        _ => None,
    };

    let bean = Hysteria2Bean {
        server: host_str(&url)?,
        ports,
        auth,
        obfs_password,
        sni: query_param(&url, "sni"),
        allow_insecure: query_param(&url, "insecure").as_deref() == Some("1"),
        pin_sha256: query_param(&url, "pinSHA256"),
        ca: None,
        up_mbps: 0,
        down_mbps: 0,
        hop_interval: 10,
        port_hopping: true,
    };
    Ok(ParsedLink {
        bean: ProxyBean::Hysteria2(bean),
        name: fragment_name(&url),
    })
}

pub fn format(bean: &Hysteria2Bean, name: &str) -> String {
    let host = if bean.server.contains(':') {
        format!("[{}]", bean.server)
    } else {
        bean.server.clone()
    };

    let auth = match bean.auth.as_deref() {
        Some(auth) => match auth.split_once(':') {
            Some((username, password)) => {
                format!("{}:{}@", encode(username), encode(password))
            }
            None => format!("{}@", encode(auth)),
        },
        None => String::new(),
    };

    let (placeholder_port, mport) = match PortSpec::parse(&bean.ports) {
        Ok(spec) => match spec.single() {
            Some(port) => (port, None),
            // Placeholder port for round-tripping; the real set rides in
            // mport.
            None => (spec.dial_port(), Some(bean.ports.clone())),
        },
        Err(_) => (443, Some(bean.ports.clone())),
    };

    let mut link = format!("hysteria2://{}{}:{}/", auth, host, placeholder_port);
    let mut separator = '?';
    let mut push_param = |link: &mut String, key: &str, value: &str| {
        link.push(separator);
        separator = '&';
        link.push_str(key);
        link.push('=');
        link.push_str(value);
    };
    if let Some(mport) = mport.as_deref() {
        push_param(&mut link, "mport", mport);
    }
    if let Some(sni) = bean.sni.as_deref() {
        push_param(&mut link, "sni", &encode(sni));
    }
    if bean.allow_insecure {
        push_param(&mut link, "insecure", "1");
    }
    if let Some(pin) = bean.pin_sha256.as_deref() {
        push_param(&mut link, "pinSHA256", &encode(pin));
    }
    if let Some(obfs_password) = bean.obfs_password.as_deref() {
        push_param(&mut link, "obfs", "salamander");
        push_param(&mut link, "obfs-password", &encode(obfs_password));
    }
    if !name.is_empty() {
        link.push('#');
        link.push_str(&encode(name));
    }
    link
}
