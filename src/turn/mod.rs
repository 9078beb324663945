pub mod allocation;
pub mod five_tuple;
pub mod nonce;
pub mod operations;
pub mod relay;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error as ThisError;
use tokio::net::UdpSocket;

use self::{
    allocation::manager::Manager, five_tuple::Protocol, nonce::NonceStore,
    operations::{Env, Processor}, relay::RelayAddressGenerator,
};
use crate::stun::{Key, StunError};

/// The SOFTWARE attribute value stamped onto responses.
pub const SOFTWARE: &str = concat!("turnd.", env!("CARGO_PKG_VERSION"));

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Stun(#[from] StunError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("duplicated nonce generated")]
    DuplicatedNonce,
    #[error("no such user: {0}")]
    NoSuchUser(String),
    #[error("missing nonce attribute")]
    MissingNonce,
    #[error("missing realm attribute")]
    MissingRealm,
    #[error("missing username attribute")]
    MissingUsername,
    #[error("unhandled message: method={0:#06x}")]
    UnhandledMessage(u16),
    #[error("allocation mismatch")]
    AllocationMismatch,
    #[error("unsupported transport protocol")]
    UnsupportedTransport,
    #[error("insufficient capacity")]
    InsufficientCapacity,
}

/// Write half of a client-facing connection.
///
/// Listeners own their sockets; allocations and handlers only borrow
/// this to push bytes back to the client.  For UDP the target matters,
/// for TCP the connection is already bound to one client and the target
/// is ignored.
#[async_trait]
pub trait ClientConn: Send + Sync {
    async fn send_to(&self, bytes: &[u8], target: SocketAddr) -> io::Result<()>;
}

#[async_trait]
impl ClientConn for UdpSocket {
    async fn send_to(&self, bytes: &[u8], target: SocketAddr) -> io::Result<()> {
        UdpSocket::send_to(self, bytes, target).await?;
        Ok(())
    }
}

/// Hooks the embedder supplies to the core.
///
/// `auth` and `permit` are the two decision points; the remaining
/// methods are notifications and default to no-ops.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Long-term credential lookup.
    ///
    /// Returns the 16-byte HMAC key for the username in the realm,
    /// typically `MD5(username:realm:password)`, or `None` when the
    /// user is unknown.
    #[allow(unused)]
    async fn auth(&self, username: &str, realm: &str, addr: SocketAddr) -> Option<Key> {
        None
    }

    /// Peer admission control.
    ///
    /// Called for every XOR-PEER-ADDRESS in CreatePermission and
    /// ChannelBind requests; returning false rejects the request with
    /// 403 Forbidden.  The default permits everything.
    #[allow(unused)]
    fn permit(&self, addr: SocketAddr, peer: IpAddr) -> bool {
        true
    }

    /// allocate request
    ///
    /// In all cases, the server SHOULD only allocate ports from the
    /// range 49152 - 65535 (the Dynamic and/or Private Port range),
    /// and SHOULD NOT allocate ports in the range 0 - 1023.
    #[allow(unused)]
    fn allocated(&self, addr: SocketAddr, username: &str, port: u16) {}

    /// refresh request
    ///
    /// A zero lifetime means the client asked for the allocation to be
    /// deleted.
    #[allow(unused)]
    fn refreshed(&self, addr: SocketAddr, username: &str, lifetime: u32) {}

    /// create permission request
    ///
    /// Retransmitted CreatePermission requests simply refresh the
    /// permissions, so this may fire repeatedly for one peer.
    #[allow(unused)]
    fn permission_created(&self, addr: SocketAddr, username: &str, peer: IpAddr) {}

    /// channel binding request
    #[allow(unused)]
    fn channel_bound(&self, addr: SocketAddr, username: &str, number: u16) {}

    /// the allocation for this client went away, by request, by expiry
    /// or because the transport closed.
    #[allow(unused)]
    fn closed(&self, addr: SocketAddr) {}
}

/// Service options.
pub struct Options {
    /// the realm sent in challenges and used to derive credentials.
    pub realm: String,
    /// lifetime of channel bindings, 10 minutes unless overridden.
    pub channel_bind_timeout: Duration,
    /// hard cap on requested allocation lifetimes, one hour per the
    /// RFC 5766 recommendation.
    pub max_lifetime: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            realm: "localhost".to_string(),
            channel_bind_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

/// TURN service.
///
/// Owns the allocation manager and the nonce store; listeners pull a
/// [`Processor`] per socket and feed it datagrams.  Clones share the
/// same state.
#[derive(Clone)]
pub struct Service {
    options: Arc<Options>,
    observer: Arc<dyn Observer>,
    nonces: Arc<NonceStore>,
    manager: Arc<Manager>,
}

impl Service {
    pub fn new<T, G>(options: Options, observer: T, relay: G) -> Self
    where
        T: Observer + 'static,
        G: RelayAddressGenerator + 'static,
    {
        let options = Arc::new(options);
        let observer: Arc<dyn Observer> = Arc::new(observer);
        let nonces = Arc::new(NonceStore::default());
        let manager = Manager::new(Arc::new(relay), observer.clone(), options.clone());
        manager.start_sweeper(nonces.clone());

        Self {
            options,
            observer,
            nonces,
            manager,
        }
    }

    /// a per-listener message processor.
    ///
    /// `interface` is the local address of the listener socket; it
    /// becomes the destination half of every five-tuple seen here.
    /// `external` is the interface's advertised address: relayed
    /// transport addresses allocated through this listener carry its
    /// IP.
    pub fn get_processor(
        &self,
        conn: Arc<dyn ClientConn>,
        interface: SocketAddr,
        external: SocketAddr,
        protocol: Protocol,
    ) -> Processor {
        Processor::new(
            Env {
                options: self.options.clone(),
                manager: self.manager.clone(),
                nonces: self.nonces.clone(),
                observer: self.observer.clone(),
            },
            conn,
            interface,
            external,
            protocol,
        )
    }

    pub fn get_manager(&self) -> Arc<Manager> {
        self.manager.clone()
    }
}
