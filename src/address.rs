use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// A remote server address: a literal IP, or a hostname resolved by
/// whoever ends up dialing it (the engine or a worker binary).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Hostname(String),
}

impl Address {
    pub fn from(s: &str) -> std::io::Result<Self> {
        if s.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Empty address",
            ));
        }

        let mut dots = 0;
        let mut possible_ipv4 = true;
        let mut possible_ipv6 = true;
        let mut possible_hostname = true;
        for b in s.as_bytes().iter() {
            let c = *b;
            if c == b':' {
                possible_ipv4 = false;
                possible_hostname = false;
                break;
            } else if c == b'.' {
                possible_ipv6 = false;
                dots += 1;
                if dots > 3 {
                    // can only be a hostname.
                    break;
                }
            } else if (b'A'..=b'F').contains(&c) || (b'a'..=b'f').contains(&c) {
                possible_ipv4 = false;
            } else if !c.is_ascii_digit() {
                possible_ipv4 = false;
                possible_ipv6 = false;
                break;
            }
        }

        if possible_ipv4 && dots == 3 {
            if let Ok(addr) = s.parse::<Ipv4Addr>() {
                return Ok(Address::Ipv4(addr));
            }
        }

        if possible_ipv6 {
            if let Ok(addr) = s.parse::<Ipv6Addr>() {
                return Ok(Address::Ipv6(addr));
            }
        }

        if possible_hostname {
            return Ok(Address::Hostname(s.to_string()));
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse address: {s}"),
        ))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Address::Ipv6(_))
    }

    pub fn is_ip(&self) -> bool {
        !matches!(self, Address::Hostname(_))
    }

    pub fn hostname(&self) -> Option<&str> {
        match self {
            Address::Hostname(hostname) => Some(hostname),
            _ => None,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Address::Ipv4(i) => write!(f, "{i}"),
            Address::Ipv6(i) => write!(f, "{i}"),
            Address::Hostname(h) => write!(f, "{h}"),
        }
    }
}

/// An address and port pair. Displays as `host:port`, with IPv6 addresses
/// bracketed the way worker config files and URIs expect them.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct NetLocation {
    address: Address,
    port: u16,
}

impl NetLocation {
    pub const fn new(address: Address, port: u16) -> Self {
        Self { address, port }
    }

    pub fn from_ip_addr(ip: IpAddr, port: u16) -> Self {
        match ip {
            IpAddr::V4(addr) => Self::new(Address::Ipv4(addr), port),
            IpAddr::V6(addr) => Self::new(Address::Ipv6(addr), port),
        }
    }

    /// A loopback location, where every hop listens.
    pub fn localhost(port: u16) -> Self {
        Self::new(Address::Ipv4(Ipv4Addr::LOCALHOST), port)
    }

    /// Parses `host`, `host:port`, or `[v6]:port`. A missing port falls
    /// back to `default_port`.
    pub fn from_str(s: &str, default_port: Option<u16>) -> std::io::Result<Self> {
        if s.starts_with('[') {
            return match s.find(']') {
                Some(end) => {
                    let address = Address::from(&s[1..end])?;
                    if !address.is_ipv6() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("Bracketed address is not IPv6: {s}"),
                        ));
                    }
                    let port = match s[end + 1..].strip_prefix(':') {
                        Some(port_str) => port_str.parse::<u16>().map_err(|e| {
                            std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                format!("Invalid port in {s}: {e}"),
                            )
                        })?,
                        None => default_port.ok_or_else(|| {
                            std::io::Error::new(std::io::ErrorKind::InvalidData, "No port")
                        })?,
                    };
                    Ok(Self::new(address, port))
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Unterminated IPv6 address: {s}"),
                )),
            };
        }

        let (address_str, port, expect_ipv6) = match s.rfind(':') {
            Some(i) => {
                // The ':' could be from an unbracketed ipv6 address.
                match s[i + 1..].parse::<u16>() {
                    Ok(port) => (&s[0..i], Some(port), false),
                    Err(_) => (s, default_port, true),
                }
            }
            None => (s, default_port, false),
        };

        let address = Address::from(address_str)?;
        if expect_ipv6 && !address.is_ipv6() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid location: {s}"),
            ));
        }

        let port = port
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "No port"))?;

        Ok(Self { address, port })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match &self.address {
            Address::Ipv4(addr) => Some(SocketAddr::new(IpAddr::V4(*addr), self.port)),
            Address::Ipv6(addr) => Some(SocketAddr::new(IpAddr::V6(*addr), self.port)),
            Address::Hostname(_) => None,
        }
    }
}

impl std::fmt::Display for NetLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.address.is_ipv6() {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl Serialize for NetLocation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetLocation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NetLocation::from_str(&s, None).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_ipv4() {
        assert_eq!(
            Address::from("10.0.0.1").unwrap(),
            Address::Ipv4(Ipv4Addr::new(10, 0, 0, 1))
        );
    }

    #[test]
    fn test_address_parse_ipv6() {
        assert!(Address::from("2001:db8::1").unwrap().is_ipv6());
    }

    #[test]
    fn test_address_parse_hostname() {
        assert_eq!(
            Address::from("proxy.example.com").unwrap(),
            Address::Hostname("proxy.example.com".to_string())
        );
    }

    #[test]
    fn test_address_rejects_empty() {
        assert!(Address::from("").is_err());
    }

    #[test]
    fn test_location_with_port() {
        let loc = NetLocation::from_str("example.com:8443", None).unwrap();
        assert_eq!(loc.port(), 8443);
        assert_eq!(loc.to_string(), "example.com:8443");
    }

    #[test]
    fn test_location_default_port() {
        let loc = NetLocation::from_str("example.com", Some(443)).unwrap();
        assert_eq!(loc.port(), 443);
    }

    #[test]
    fn test_location_missing_port() {
        assert!(NetLocation::from_str("example.com", None).is_err());
    }

    #[test]
    fn test_location_bracketed_ipv6() {
        let loc = NetLocation::from_str("[2001:db8::1]:443", None).unwrap();
        assert!(loc.address().is_ipv6());
        assert_eq!(loc.port(), 443);
        assert_eq!(loc.to_string(), "[2001:db8::1]:443");
    }

    #[test]
    fn test_location_serde_round_trip() {
        let loc = NetLocation::from_str("example.com:443", None).unwrap();
        let yaml = serde_yaml::to_string(&loc).unwrap();
        let parsed: NetLocation = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(loc, parsed);
    }
}
