//! Share-link codecs: bean <-> URI for the protocols with standard link
//! formats. These are pure functions over the bean model; the
//! orchestration core never calls them, but the CLI's import command and
//! subscription tooling do.

mod hysteria2;
mod naive;
mod shadowsocks;
mod simple;
mod trojan;

use crate::bean::ProxyBean;

/// A parsed link: the bean plus the fragment-encoded profile name.
#[derive(Debug)]
pub struct ParsedLink {
    pub bean: ProxyBean,
    pub name: String,
}

fn invalid(reason: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("Invalid link: {reason}"),
    )
}

/// Parses a share URI into a bean, dispatching on the scheme.
pub fn parse_link(link: &str) -> std::io::Result<ParsedLink> {
    let scheme = link.split("://").next().unwrap_or("");
    match scheme {
        "ss" => shadowsocks::parse(link),
        "socks" | "socks4" | "socks4a" | "socks5" => simple::parse_socks(link),
        "http" | "https" => simple::parse_http(link),
        "trojan" => trojan::parse(link),
        "naive+https" | "naive+quic" => naive::parse(link),
        "hysteria2" | "hy2" => hysteria2::parse(link),
        _ => Err(invalid(format!("unsupported scheme: {scheme}"))),
    }
}

/// Formats a bean back into its share URI. Returns `None` for beans
/// without a standard link format.
pub fn format_link(bean: &ProxyBean, name: &str) -> Option<String> {
    match bean {
        ProxyBean::Shadowsocks(bean) => Some(shadowsocks::format(bean, name)),
        ProxyBean::Socks(bean) => Some(simple::format_socks(bean, name)),
        ProxyBean::Http(bean) => Some(simple::format_http(bean, name)),
        ProxyBean::Trojan(bean) => Some(trojan::format(bean, name)),
        ProxyBean::Naive(bean) => Some(naive::format(bean, name)),
        ProxyBean::Hysteria2(bean) => Some(hysteria2::format(bean, name)),
        _ => None,
    }
}

pub(crate) fn host_str(url: &url::Url) -> std::io::Result<String> {
    match url.host_str() {
        // Url brackets v6 hosts; beans store them raw.
        Some(host) => Ok(host.trim_matches(['[', ']']).to_string()),
        None => Err(invalid("missing host")),
    }
}

pub(crate) fn decode(part: &str) -> String {
    percent_encoding::percent_decode_str(part)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| part.to_string())
}

pub(crate) fn encode(part: &str) -> String {
    percent_encoding::utf8_percent_encode(part, percent_encoding::NON_ALPHANUMERIC).to_string()
}

pub(crate) fn fragment_name(url: &url::Url) -> String {
    url.fragment().map(decode).unwrap_or_default()
}

pub(crate) fn query_param(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scheme_rejected() {
        assert!(parse_link("carrier-pigeon://example.com").is_err());
    }

    #[test]
    fn test_group_beans_have_no_link() {
        let bean: crate::bean::ProfileNode =
            serde_yaml::from_str("id: 1\ntype: chain\nproxies: [2, 3]").unwrap();
        assert!(format_link(&bean.bean, "x").is_none());
    }
}
