//! socks:// and http(s):// links.

use crate::bean::{HttpBean, ProxyBean, SocksBean, SocksVersion};

use super::{ParsedLink, decode, encode, fragment_name, host_str, invalid, query_param};

fn userinfo(url: &url::Url) -> (Option<String>, Option<String>) {
    let username = match url.username() {
        "" => None,
        username => Some(decode(username)),
    };
    let password = url.password().map(decode);
    (username, password)
}

fn host_port(server: &str, port: u16) -> String {
    if server.contains(':') {
        format!("[{server}]:{port}")
    } else {
        format!("{server}:{port}")
    }
}

pub fn parse_socks(link: &str) -> std::io::Result<ParsedLink> {
    let url = url::Url::parse(link).map_err(invalid)?;
    let version = match url.scheme() {
        "socks4" => SocksVersion::V4,
        "socks4a" => SocksVersion::V4a,
        _ => SocksVersion::V5,
    };
    let (username, password) = userinfo(&url);
    let bean = SocksBean {
        server: host_str(&url)?,
        port: url.port().unwrap_or(1080),
        version,
        username,
        password,
    };
    Ok(ParsedLink {
        bean: ProxyBean::Socks(bean),
        name: fragment_name(&url),
    })
}

pub fn format_socks(bean: &SocksBean, name: &str) -> String {
    let scheme = match bean.version {
        SocksVersion::V4 => "socks4",
        SocksVersion::V4a => "socks4a",
        SocksVersion::V5 => "socks5",
    };
    let auth = match (bean.username.as_deref(), bean.password.as_deref()) {
        (Some(username), Some(password)) => {
            format!("{}:{}@", encode(username), encode(password))
        }
        (Some(username), None) => format!("{}@", encode(username)),
        _ => String::new(),
    };
    let mut link = format!(
        "{}://{}{}",
        scheme,
        auth,
        host_port(&bean.server, bean.port)
    );
    if !name.is_empty() {
        link.push('#');
        link.push_str(&encode(name));
    }
    link
}

pub fn parse_http(link: &str) -> std::io::Result<ParsedLink> {
    let url = url::Url::parse(link).map_err(invalid)?;
    let tls = url.scheme() == "https";
    let (username, password) = userinfo(&url);
    let bean = HttpBean {
        server: host_str(&url)?,
        port: url
            .port()
            .unwrap_or(if tls { 443 } else { 80 }),
        username,
        password,
        tls,
        sni: query_param(&url, "sni"),
    };
    Ok(ParsedLink {
        bean: ProxyBean::Http(bean),
        name: fragment_name(&url),
    })
}

pub fn format_http(bean: &HttpBean, name: &str) -> String {
    let scheme = if bean.tls { "https" } else { "http" };
    let auth = match (bean.username.as_deref(), bean.password.as_deref()) {
        (Some(username), Some(password)) => {
            format!("{}:{}@", encode(username), encode(password))
        }
        (Some(username), None) => format!("{}@", encode(username)),
        _ => String::new(),
    };
    let mut link = format!(
        "{}://{}{}",
        scheme,
        auth,
        host_port(&bean.server, bean.port)
    );
    if let Some(sni) = bean.sni.as_deref() {
        link.push_str("/?sni=");
        link.push_str(&encode(sni));
    }
    if !name.is_empty() {
        link.push('#');
        link.push_str(&encode(name));
    }
    link
}
