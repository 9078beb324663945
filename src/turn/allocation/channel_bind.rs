use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A binding lasts 10 minutes unless refreshed; the value is the
/// configurable channel-bind timeout, this is the default.
pub const CHANNEL_BIND_LIFETIME: Duration = Duration::from_secs(600);

/// An expired binding may not be taken over by a different peer or
/// number until a further 5 minutes have passed (RFC 5766 §11: the
/// client must wait 5 minutes before rebinding).
pub const CHANNEL_QUIESCENCE: Duration = Duration::from_secs(300);

struct Binding {
    number: u16,
    peer: SocketAddr,
    expires_at: Instant,
}

/// The channel bindings of one allocation.
///
/// Within an allocation the mapping is injective both ways: a channel
/// number is bound to exactly one peer and a peer to exactly one
/// channel number.  A binding that has expired stays in the table for a
/// quiescence window during which it can only be refreshed by the same
/// (number, peer) pair, never rebound.
#[derive(Default)]
pub struct ChannelTable {
    bindings: Mutex<Vec<Binding>>,
}

impl ChannelTable {
    /// install or refresh the binding `number <-> peer`.
    ///
    /// Returns false when the pair conflicts with an existing binding:
    /// the number bound to another peer, or the peer bound to another
    /// number, and the old binding is not yet past its quiescence
    /// window.
    pub fn bind(&self, number: u16, peer: SocketAddr, lifetime: Duration) -> bool {
        self.bind_at(number, peer, lifetime, Instant::now())
    }

    fn bind_at(&self, number: u16, peer: SocketAddr, lifetime: Duration, now: Instant) -> bool {
        let mut bindings = self.bindings.lock();
        bindings.retain(|it| now < it.expires_at + CHANNEL_QUIESCENCE);

        for binding in bindings.iter_mut() {
            let number_matches = binding.number == number;
            let peer_matches = binding.peer == peer;

            if number_matches && peer_matches {
                binding.expires_at = now + lifetime;
                return true;
            }

            if number_matches || peer_matches {
                return false;
            }
        }

        bindings.push(Binding {
            number,
            peer,
            expires_at: now + lifetime,
        });

        true
    }

    /// the peer a live channel number is bound to.
    pub fn peer(&self, number: u16) -> Option<SocketAddr> {
        self.peer_at(number, Instant::now())
    }

    fn peer_at(&self, number: u16, now: Instant) -> Option<SocketAddr> {
        self.bindings
            .lock()
            .iter()
            .find(|it| it.number == number && now < it.expires_at)
            .map(|it| it.peer)
    }

    /// the live channel number a peer transport address is bound to.
    pub fn number(&self, peer: &SocketAddr) -> Option<u16> {
        self.number_at(peer, Instant::now())
    }

    fn number_at(&self, peer: &SocketAddr, now: Instant) -> Option<u16> {
        self.bindings
            .lock()
            .iter()
            .find(|it| it.peer == *peer && now < it.expires_at)
            .map(|it| it.number)
    }

    pub fn count(&self) -> usize {
        self.bindings.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn bidirectional_lookup() {
        let table = ChannelTable::default();
        assert!(table.bind(0x4000, addr("1.2.3.5:5678"), CHANNEL_BIND_LIFETIME));

        assert_eq!(table.peer(0x4000), Some(addr("1.2.3.5:5678")));
        assert_eq!(table.number(&addr("1.2.3.5:5678")), Some(0x4000));
        assert_eq!(table.peer(0x4001), None);
    }

    #[test]
    fn injective_both_ways() {
        let table = ChannelTable::default();
        assert!(table.bind(0x4000, addr("1.2.3.5:5678"), CHANNEL_BIND_LIFETIME));

        // the same number may not point at a second peer.
        assert!(!table.bind(0x4000, addr("1.2.3.6:5678"), CHANNEL_BIND_LIFETIME));
        // the same peer may not get a second number.
        assert!(!table.bind(0x4001, addr("1.2.3.5:5678"), CHANNEL_BIND_LIFETIME));

        // refreshing the same pair is always allowed.
        assert!(table.bind(0x4000, addr("1.2.3.5:5678"), CHANNEL_BIND_LIFETIME));

        // an unrelated pair is fine.
        assert!(table.bind(0x4001, addr("1.2.3.6:5678"), CHANNEL_BIND_LIFETIME));
    }

    #[test]
    fn expired_bindings_stop_forwarding() {
        let table = ChannelTable::default();
        let peer = addr("1.2.3.5:5678");
        assert!(table.bind_at(0x4000, peer, CHANNEL_BIND_LIFETIME, Instant::now()));

        let expired = Instant::now() + CHANNEL_BIND_LIFETIME + Duration::from_secs(1);
        assert_eq!(table.peer_at(0x4000, expired), None);
        assert_eq!(table.number_at(&peer, expired), None);
    }

    #[test]
    fn quiescence_blocks_rebinding() {
        let table = ChannelTable::default();
        let now = Instant::now();
        assert!(table.bind_at(0x4000, addr("1.2.3.5:5678"), CHANNEL_BIND_LIFETIME, now));

        // expired but still inside the quiescence window: a different
        // peer may not take the number over.
        let in_quiescence = now + CHANNEL_BIND_LIFETIME + Duration::from_secs(30);
        assert!(!table.bind_at(
            0x4000,
            addr("1.2.3.6:5678"),
            CHANNEL_BIND_LIFETIME,
            in_quiescence
        ));

        // past the window the number is free again.
        let past = now + CHANNEL_BIND_LIFETIME + CHANNEL_QUIESCENCE + Duration::from_secs(1);
        assert!(table.bind_at(
            0x4000,
            addr("1.2.3.6:5678"),
            CHANNEL_BIND_LIFETIME,
            past
        ));
    }
}
