use std::fmt;
use std::net::SocketAddr;

/// The transport protocol on the client side of the session.
///
/// The relay side is always UDP; this only distinguishes how the client
/// reached the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        })
    }
}

/// The identity of a client/listener pair.
///
/// When a TURN message arrives at the server from the client, the server
/// uses the 5-tuple in the message to identify the associated
/// allocation; a five-tuple identifies at most one live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    /// client source address.
    pub src: SocketAddr,
    /// listener address the datagram arrived on.
    pub dst: SocketAddr,
    pub protocol: Protocol,
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.src, self.dst, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ahash::AHashMap;

    #[test]
    fn identity() {
        let src = "127.0.0.1:5000".parse().unwrap();
        let dst = "127.0.0.1:3478".parse().unwrap();

        let udp = FiveTuple {
            src,
            dst,
            protocol: Protocol::Udp,
        };

        let tcp = FiveTuple {
            src,
            dst,
            protocol: Protocol::Tcp,
        };

        // the protocol participates in the identity.
        assert_ne!(udp, tcp);

        let mut table = AHashMap::new();
        table.insert(udp, 1);
        table.insert(tcp, 2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&udp), Some(&1));
    }
}
