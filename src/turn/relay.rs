use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::net::UdpSocket;

use crate::turn::Error;

/// Provider of relayed transport addresses.
///
/// The server core does not choose relay ports itself; the embedder
/// hands it this capability.  `external` is the NAT-facing IP of the
/// listener interface the allocation is being created through, so that
/// a server with several differently exposed interfaces advertises the
/// right one; the advertised address may therefore differ from the
/// socket's local address.
#[async_trait]
pub trait RelayAddressGenerator: Send + Sync {
    /// Bind a relay socket, either on the requested port or on a port of
    /// the generator's choosing when `requested_port` is zero.  Returns
    /// the socket together with the address to put into
    /// XOR-RELAYED-ADDRESS.
    async fn allocate_socket(
        &self,
        requested_port: u16,
        external: IpAddr,
    ) -> Result<(Arc<UdpSocket>, SocketAddr), Error>;
}

/// Default generator: binds on a local interface and advertises the
/// external IP it is given, picking ports at random from a configured
/// range.
///
/// In all cases, the server SHOULD only allocate ports from the range
/// 49152 - 65535 (the Dynamic and/or Private Port range), unless the
/// TURN server application knows that other applications running on the
/// same host will not be impacted (RFC 5766 §6.2).
pub struct RelayAllocator {
    pub bind_ip: IpAddr,
    pub min_port: u16,
    pub max_port: u16,
}

impl RelayAllocator {
    async fn bind(
        &self,
        port: u16,
        external: IpAddr,
    ) -> std::io::Result<(Arc<UdpSocket>, SocketAddr)> {
        let socket = UdpSocket::bind(SocketAddr::new(self.bind_ip, port)).await?;
        let local = socket.local_addr()?;
        Ok((Arc::new(socket), SocketAddr::new(external, local.port())))
    }
}

#[async_trait]
impl RelayAddressGenerator for RelayAllocator {
    async fn allocate_socket(
        &self,
        requested_port: u16,
        external: IpAddr,
    ) -> Result<(Arc<UdpSocket>, SocketAddr), Error> {
        if requested_port != 0 {
            return self
                .bind(requested_port, external)
                .await
                .map_err(|_| Error::InsufficientCapacity);
        }

        if self.min_port == 0 && self.max_port == 0 {
            return self
                .bind(0, external)
                .await
                .map_err(|_| Error::InsufficientCapacity);
        }

        // random assignment inside the configured range, a bounded
        // number of attempts before giving up on a crowded host.
        for _ in 0..32 {
            let port = rand::thread_rng().gen_range(self.min_port..=self.max_port);
            if let Ok(bound) = self.bind(port, external).await {
                return Ok(bound);
            }
        }

        Err(Error::InsufficientCapacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> RelayAllocator {
        RelayAllocator {
            bind_ip: "127.0.0.1".parse().unwrap(),
            min_port: 49152,
            max_port: 65535,
        }
    }

    fn external() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn allocates_in_range() {
        let (socket, advertised) = allocator().allocate_socket(0, external()).await.unwrap();

        assert!(advertised.port() >= 49152);
        assert_eq!(advertised.port(), socket.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn honors_requested_port() {
        // grab an ephemeral port first so the request below is for a
        // port known to be free.
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let (_socket, advertised) = allocator().allocate_socket(port, external()).await.unwrap();
        assert_eq!(advertised.port(), port);
    }

    #[tokio::test]
    async fn advertises_the_external_ip() {
        let nat_facing: IpAddr = "203.0.113.10".parse().unwrap();
        let (socket, advertised) = allocator().allocate_socket(0, nat_facing).await.unwrap();

        assert_eq!(advertised.ip(), nat_facing);
        assert_eq!(advertised.port(), socket.local_addr().unwrap().port());
    }
}
