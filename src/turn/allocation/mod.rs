pub mod channel_bind;
pub mod manager;
pub mod permission;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use self::{channel_bind::ChannelTable, permission::Permissions};
use crate::stun::{
    attribute::{Data, XorPeerAddress},
    method::DATA_INDICATION,
    ChannelData, Key, MessageEncoder,
};
use crate::turn::{five_tuple::FiveTuple, ClientConn, Error};

/// Used when an Allocate request carries no LIFETIME attribute
/// (RFC 5766 §2.2).
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(600);

/// A running relay.
///
/// The allocation owns its relay socket; the client-facing connection
/// belongs to the listener and is only borrowed for writes.  Once live,
/// a background pump forwards peer datagrams back to the client until
/// the allocation is removed.
pub struct Allocation {
    five_tuple: FiveTuple,
    /// the advertised relayed transport address; may differ from the
    /// socket's local address behind a NAT.
    relay_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    /// the username that created the allocation; all later requests on
    /// this five-tuple must present the same one.
    username: String,
    /// integrity key cached from the creating request, used to sign
    /// refresh responses.
    key: Key,
    reservation_token: Option<u64>,
    permissions: Arc<Permissions>,
    channels: Arc<ChannelTable>,
    expires_at: Mutex<Instant>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Allocation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        five_tuple: FiveTuple,
        socket: Arc<UdpSocket>,
        relay_addr: SocketAddr,
        username: String,
        key: Key,
        lifetime: Duration,
        reservation_token: Option<u64>,
    ) -> Self {
        Self {
            five_tuple,
            relay_addr,
            socket,
            username,
            key,
            reservation_token,
            permissions: Arc::new(Permissions::default()),
            channels: Arc::new(ChannelTable::default()),
            expires_at: Mutex::new(Instant::now() + lifetime),
            pump: Mutex::new(None),
        }
    }

    pub fn five_tuple(&self) -> &FiveTuple {
        &self.five_tuple
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn reservation_token(&self) -> Option<u64> {
        self.reservation_token
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// push the expiry out to `lifetime` from now.
    pub fn refresh(&self, lifetime: Duration) {
        *self.expires_at.lock() = Instant::now() + lifetime;
    }

    pub fn is_expired(&self) -> bool {
        self.expired_at(Instant::now())
    }

    pub(crate) fn expired_at(&self, now: Instant) -> bool {
        *self.expires_at.lock() <= now
    }

    /// write a datagram to a peer on the relay socket.
    pub async fn relay(&self, bytes: &[u8], peer: SocketAddr) -> Result<(), Error> {
        self.socket.send_to(bytes, peer).await?;
        Ok(())
    }

    // The peer->client direction.  Kept out of the constructor so an
    // allocation that loses the index insertion race never runs a pump.
    pub(crate) fn start_pump(&self, conn: Arc<dyn ClientConn>) {
        let socket = self.socket.clone();
        let permissions = self.permissions.clone();
        let channels = self.channels.clone();
        let client = self.five_tuple.src;

        *self.pump.lock() = Some(tokio::spawn(relay_pump(
            socket,
            conn,
            client,
            permissions,
            channels,
        )));
    }

    /// tear the allocation down.
    ///
    /// Aborting the pump releases its handle on the relay socket, so
    /// the socket closes together with the allocation; taking the
    /// handle out of the slot makes the close single-shot.
    pub(crate) fn close(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read loop on the relay socket.
///
/// For each datagram from a peer: drop it unless the source IP holds a
/// live permission; wrap it as channel data when the source transport
/// address has a live channel binding, otherwise as a Data indication
/// with a fresh transaction id (RFC 5766 §10.3).
async fn relay_pump(
    socket: Arc<UdpSocket>,
    conn: Arc<dyn ClientConn>,
    client: SocketAddr,
    permissions: Arc<Permissions>,
    channels: Arc<ChannelTable>,
) {
    let mut recv_bytes = vec![0u8; 2048];
    let mut send_bytes = BytesMut::with_capacity(2048);

    loop {
        let (size, peer) = match socket.recv_from(&mut recv_bytes).await {
            Ok(received) => received,
            Err(e) => {
                log::debug!("relay socket read failed, pump exits: {}", e);
                break;
            }
        };

        if !permissions.contains(&peer.ip()) {
            log::trace!("no permission for peer, dropped: peer={}, client={}", peer, client);
            continue;
        }

        if let Some(number) = channels.number(&peer) {
            ChannelData {
                number,
                bytes: &recv_bytes[..size],
            }
            .encode(&mut send_bytes);
        } else {
            let token: [u8; 12] = rand::random();
            let mut message = MessageEncoder::new(DATA_INDICATION, &token, &mut send_bytes);
            message.append::<XorPeerAddress>(peer);
            message.append::<Data>(&recv_bytes[..size]);
            if message.flush(None).is_err() {
                continue;
            }
        }

        if let Err(e) = conn.send_to(&send_bytes, client).await {
            log::warn!("failed to forward peer data to {}: {}", client, e);
        }
    }
}
