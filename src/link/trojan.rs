//! trojan:// links: `trojan://password@host:port?sni=...#name`.

use crate::bean::{ProxyBean, TrojanBean};
use crate::bean::common::{StreamTransport, TlsSettings};

use super::{ParsedLink, decode, encode, fragment_name, host_str, invalid, query_param};

pub fn parse(link: &str) -> std::io::Result<ParsedLink> {
    let url = url::Url::parse(link).map_err(invalid)?;
    let password = match url.username() {
        "" => return Err(invalid("missing trojan password")),
        username => decode(username),
    };
    let tls = TlsSettings {
        sni: query_param(&url, "sni"),
        allow_insecure: query_param(&url, "allowInsecure").as_deref() == Some("1"),
        ..Default::default()
    };
    let bean = TrojanBean {
        server: host_str(&url)?,
        port: url.port().unwrap_or(443),
        password,
        transport: StreamTransport::Tcp,
        tls: Some(tls),
    };
    Ok(ParsedLink {
        bean: ProxyBean::Trojan(bean),
        name: fragment_name(&url),
    })
}

pub fn format(bean: &TrojanBean, name: &str) -> String {
    let host = if bean.server.contains(':') {
        format!("[{}]", bean.server)
    } else {
        bean.server.clone()
    };
    let mut link = format!("trojan://{}@{}:{}", encode(&bean.password), host, bean.port);
    let mut separator = '?';
    if let Some(tls) = bean.tls.as_ref() {
        if let Some(sni) = tls.sni.as_deref() {
            link.push(separator);
            separator = '&';
            link.push_str("sni=");
            link.push_str(&encode(sni));
        }
        if tls.allow_insecure {
            link.push(separator);
            link.push_str("allowInsecure=1");
        }
    }
    if !name.is_empty() {
        link.push('#');
        link.push_str(&encode(name));
    }
    link
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let bean = TrojanBean {
            server: "example.com".to_string(),
            port: 443,
            password: "hunter2".to_string(),
            transport: StreamTransport::Tcp,
            tls: Some(TlsSettings {
                sni: Some("sni.example.com".to_string()),
                ..Default::default()
            }),
        };
        let link = format(&bean, "tj");
        let parsed = parse(&link).unwrap();
        assert_eq!(parsed.name, "tj");
        match parsed.bean {
            ProxyBean::Trojan(parsed) => {
                assert_eq!(parsed.server, bean.server);
                assert_eq!(parsed.password, bean.password);
                assert_eq!(
                    parsed.tls.unwrap().sni.as_deref(),
                    Some("sni.example.com")
                );
            }
            _ => panic!("wrong bean variant"),
        }
    }

    #[test]
    fn test_missing_password_rejected() {
        assert!(parse("trojan://example.com:443").is_err());
    }
}
