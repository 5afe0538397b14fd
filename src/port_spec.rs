//! Port spec parsing for protocols that support multi-port and
//! port-hopping server addresses.
//!
//! A spec is a comma-separated list of tokens, each either a single port
//! or an inclusive `from-to` range: `"443"`, `"443,8443"`, `"2000-3000"`,
//! `"443,5000-6000"`. All ports must be within 1-65535 and ranges must
//! have `from <= to`.

use rand::Rng;

use crate::error::OrchestrateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    text: String,
    ranges: Vec<(u16, u16)>,
}

impl PortSpec {
    pub fn parse(spec: &str) -> Result<Self, OrchestrateError> {
        let invalid = |reason: &str| OrchestrateError::InvalidPortSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if spec.trim().is_empty() {
            return Err(invalid("empty spec"));
        }

        let mut ranges = Vec::new();
        for token in spec.split(',') {
            let token = token.trim();
            if let Some((from_str, to_str)) = token.split_once('-') {
                let from = parse_port(from_str).ok_or_else(|| invalid("invalid range start"))?;
                let to = parse_port(to_str).ok_or_else(|| invalid("invalid range end"))?;
                if from > to {
                    return Err(invalid("range start is greater than range end"));
                }
                ranges.push((from, to));
            } else {
                let port = parse_port(token).ok_or_else(|| invalid("invalid port"))?;
                ranges.push((port, port));
            }
        }

        Ok(Self {
            text: spec.to_string(),
            ranges,
        })
    }

    /// True when the spec names more than one port (a hopping spec).
    pub fn is_multi(&self) -> bool {
        self.count() > 1
    }

    /// The single port, when the spec names exactly one.
    pub fn single(&self) -> Option<u16> {
        if self.count() == 1 {
            Some(self.ranges[0].0)
        } else {
            None
        }
    }

    /// Total number of ports covered.
    pub fn count(&self) -> usize {
        self.ranges
            .iter()
            .map(|(from, to)| (*to as usize) - (*from as usize) + 1)
            .sum()
    }

    /// Picks one port to dial, uniformly across the whole spec. Used when
    /// a hopping-capable hop must be pinned to a single upstream port
    /// (chained hops, or engines without hopping support).
    pub fn dial_port(&self) -> u16 {
        if let Some(port) = self.single() {
            return port;
        }
        let index = rand::thread_rng().gen_range(0..self.count());
        let mut skipped = 0usize;
        for (from, to) in self.ranges.iter() {
            let len = (*to as usize) - (*from as usize) + 1;
            if index < skipped + len {
                return from + (index - skipped) as u16;
            }
            skipped += len;
        }
        unreachable!("index within count")
    }

    /// The original spec text, as worker configs expect it.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for PortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn parse_port(s: &str) -> Option<u16> {
    match s.trim().parse::<u16>() {
        Ok(0) => None,
        Ok(port) => Some(port),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_port() {
        let spec = PortSpec::parse("80").unwrap();
        assert_eq!(spec.single(), Some(80));
        assert!(!spec.is_multi());
        assert_eq!(spec.dial_port(), 80);
    }

    #[test]
    fn test_multi_port_list() {
        let spec = PortSpec::parse("80,443").unwrap();
        assert!(spec.is_multi());
        assert_eq!(spec.count(), 2);
        assert_eq!(spec.single(), None);
    }

    #[test]
    fn test_port_range() {
        let spec = PortSpec::parse("1000-2000").unwrap();
        assert!(spec.is_multi());
        assert_eq!(spec.count(), 1001);
    }

    #[test]
    fn test_mixed_list_and_range() {
        let spec = PortSpec::parse("443,5000-5002").unwrap();
        assert_eq!(spec.count(), 4);
        for _ in 0..32 {
            let port = spec.dial_port();
            assert!(port == 443 || (5000..=5002).contains(&port), "{port}");
        }
    }

    #[test]
    fn test_reversed_range_invalid() {
        assert!(PortSpec::parse("2000-1000").is_err());
    }

    #[test]
    fn test_zero_port_invalid() {
        assert!(PortSpec::parse("0-100").is_err());
    }

    #[test]
    fn test_port_out_of_range_invalid() {
        assert!(PortSpec::parse("70000").is_err());
    }

    #[test]
    fn test_non_numeric_invalid() {
        assert!(PortSpec::parse("abc").is_err());
    }

    #[test]
    fn test_empty_invalid() {
        assert!(PortSpec::parse("").is_err());
    }

    #[test]
    fn test_text_preserved() {
        let spec = PortSpec::parse("443,5000-6000").unwrap();
        assert_eq!(spec.text(), "443,5000-6000");
    }
}
