// Peer registry

use crate::error::{LedgerError, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Port assumed when an address names only a host
pub const DEFAULT_PORT: u16 = 5000;

const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "tcp"];

/// Normalized peer address (lowercase host + port)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Parse `host:port`, `host`, or a URL such as `http://host:port/path`
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| LedgerError::InvalidPeerAddress(format!("{:?}: {}", input, reason));

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty address"));
        }

        let rest = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                if !SUPPORTED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                    return Err(invalid("unsupported scheme"));
                }
                rest
            }
            None => trimmed,
        };

        // drop any path, query or fragment
        let authority = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = match after {
                "" => None,
                _ => Some(after.strip_prefix(':').ok_or_else(|| invalid("garbage after IPv6 literal"))?),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | ':'))
        {
            return Err(invalid("illegal character in host"));
        }

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None => DEFAULT_PORT,
        };
        if port == 0 {
            return Err(invalid("port 0 is not connectable"));
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for PeerAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Known peers; grows only through registration
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    peers: BTreeSet<PeerAddress>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. Returns false if it was already known.
    pub fn register(&mut self, address: &str) -> Result<bool> {
        let peer = PeerAddress::parse(address)?;
        let added = self.peers.insert(peer.clone());
        if added {
            log::info!("Registered peer {}", peer);
        }
        Ok(added)
    }

    pub fn peers(&self) -> Vec<PeerAddress> {
        self.peers.iter().cloned().collect()
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(PeerAddress::parse("http://192.168.0.5:5000").unwrap(), PeerAddress::new("192.168.0.5", 5000));
        assert_eq!(PeerAddress::parse("192.168.0.5:5001").unwrap(), PeerAddress::new("192.168.0.5", 5001));
        assert_eq!(PeerAddress::parse("tcp://Node-A.local:7000/chain?x=1").unwrap(), PeerAddress::new("node-a.local", 7000));
        assert_eq!(PeerAddress::parse("localhost").unwrap(), PeerAddress::new("localhost", DEFAULT_PORT));
        assert_eq!(PeerAddress::parse("[::1]:6000").unwrap(), PeerAddress::new("::1", 6000));
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!(PeerAddress::parse("HTTP://Example.COM:80/").unwrap().to_string(), "example.com:80");
        assert_eq!(PeerAddress::parse("[::1]").unwrap().to_string(), "[::1]:5000");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "   ", "ftp://host:1", "http://:5000", "host:notaport", "host:70000", "host:0", "[::1", "bad host:1"] {
            assert!(
                matches!(PeerAddress::parse(bad), Err(LedgerError::InvalidPeerAddress(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_register_deduplicates() {
        let mut registry = NodeRegistry::new();
        assert!(registry.register("http://127.0.0.1:5001").unwrap());
        assert!(!registry.register("127.0.0.1:5001").unwrap());
        assert!(registry.register("127.0.0.1:5002").unwrap());
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&PeerAddress::new("127.0.0.1", 5002)));
    }

    #[test]
    fn test_register_malformed_leaves_registry_unchanged() {
        let mut registry = NodeRegistry::new();
        assert!(registry.register("http://").is_err());
        assert!(registry.is_empty());
    }
}
