//! SIP002 shadowsocks links: `ss://base64(method:password)@host:port#name`.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

use crate::bean::{ProxyBean, ShadowsocksBean};

use super::{ParsedLink, encode, fragment_name, host_str, invalid, query_param};

fn decode_userinfo(userinfo: &str) -> std::io::Result<(String, String)> {
    let userinfo = super::decode(userinfo);
    // Plain "method:password" userinfo is also accepted.
    let decoded = URL_SAFE_NO_PAD
        .decode(userinfo.as_bytes())
        .or_else(|_| STANDARD.decode(userinfo.as_bytes()))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or(userinfo);
    match decoded.split_once(':') {
        Some((method, password)) => Ok((method.to_string(), password.to_string())),
        None => Err(invalid("shadowsocks userinfo is not method:password")),
    }
}

pub fn parse(link: &str) -> std::io::Result<ParsedLink> {
    let url = url::Url::parse(link).map_err(invalid)?;
    // Plain "method:password" userinfo parses as username + password.
    let userinfo = match url.password() {
        Some(password) => format!("{}:{}", url.username(), password),
        None => url.username().to_string(),
    };
    let (method, password) = decode_userinfo(&userinfo)?;
    let bean = ShadowsocksBean {
        server: host_str(&url)?,
        port: url.port().ok_or_else(|| invalid("missing port"))?,
        method,
        password,
        plugin: query_param(&url, "plugin"),
    };
    Ok(ParsedLink {
        bean: ProxyBean::Shadowsocks(bean),
        name: fragment_name(&url),
    })
}

pub fn format(bean: &ShadowsocksBean, name: &str) -> String {
    let userinfo =
        URL_SAFE_NO_PAD.encode(format!("{}:{}", bean.method, bean.password).as_bytes());
    let host = if bean.server.contains(':') {
        format!("[{}]", bean.server)
    } else {
        bean.server.clone()
    };
    let mut link = format!("ss://{}@{}:{}", userinfo, host, bean.port);
    if let Some(plugin) = bean.plugin.as_deref() {
        link.push_str("/?plugin=");
        link.push_str(&encode(plugin));
    }
    if !name.is_empty() {
        link.push('#');
        link.push_str(&encode(name));
    }
    link
}
