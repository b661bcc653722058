//! Peer node identity.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a cluster node: its IPv4 address and port.
///
/// Equality is exact match on both fields; the hash combines them. On the
/// wire a node is encoded as the raw `u32` address followed by the `u16`
/// port, little-endian.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct NodeDesc {
    /// The node's IPv4 address.
    pub ip: Ipv4Addr,
    /// The node's server port.
    pub port: u16,
}

impl NodeDesc {
    /// Creates a node descriptor from an address and port.
    #[must_use]
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip,
            port,
        }
    }

    /// A descriptor for a port on the loopback interface.
    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self::new(Ipv4Addr::LOCALHOST, port)
    }

    /// The socket address of the node's server.
    #[must_use]
    pub fn addr(self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// A single integer folding both identity fields, used to derive ring
    /// points deterministically on every node.
    pub(crate) fn identity(self) -> u64 {
        (u64::from(u32::from(self.ip)) << 16) | u64::from(self.port)
    }
}

impl From<SocketAddrV4> for NodeDesc {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl FromStr for NodeDesc {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SocketAddrV4::from_str(s).map(Self::from)
    }
}

impl std::fmt::Display for NodeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_folds_both_fields() {
        let a = NodeDesc::localhost(4000);
        let b = NodeDesc::localhost(4001);
        let c = NodeDesc::new(Ipv4Addr::new(10, 0, 0, 1), 4000);

        assert_ne!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity(), NodeDesc::localhost(4000).identity());
    }

    #[test]
    fn parses_from_socket_addr_syntax() {
        let node: NodeDesc = "127.0.0.1:4100".parse().unwrap();
        assert_eq!(node, NodeDesc::localhost(4100));
        assert_eq!(node.to_string(), "127.0.0.1:4100");
    }
}
