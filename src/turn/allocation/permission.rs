use std::net::IpAddr;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

/// Permissions expire 5 minutes after installation or refresh
/// (RFC 5766 §8).
pub const PERMISSION_LIFETIME: Duration = Duration::from_secs(300);

/// The set of peers an allocation may exchange data with.
///
/// Permissions are keyed by IP address only: the port of the peer does
/// not matter (RFC 5766 §2.3).  The lifetime is sliding, refreshed by
/// CreatePermission and implicitly by ChannelBind.
#[derive(Default)]
pub struct Permissions {
    map: Mutex<AHashMap<IpAddr, Instant>>,
}

impl Permissions {
    /// install or refresh a permission for a peer address.
    pub fn insert(&self, peer: IpAddr) {
        self.map
            .lock()
            .insert(peer, Instant::now() + PERMISSION_LIFETIME);
    }

    /// whether a live permission exists for the peer address.
    ///
    /// Expired entries are evicted on the way out.
    pub fn contains(&self, peer: &IpAddr) -> bool {
        self.contains_at(peer, Instant::now())
    }

    fn contains_at(&self, peer: &IpAddr, now: Instant) -> bool {
        let mut map = self.map.lock();
        match map.get(peer) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                map.remove(peer);
                false
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.map.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_independent() {
        let permissions = Permissions::default();
        permissions.insert("1.2.3.5".parse().unwrap());

        assert!(permissions.contains(&"1.2.3.5".parse().unwrap()));
        assert!(!permissions.contains(&"1.2.3.6".parse().unwrap()));
    }

    #[test]
    fn expiry_is_sliding() {
        let permissions = Permissions::default();
        let peer = "1.2.3.5".parse().unwrap();
        permissions.insert(peer);

        let later = Instant::now() + PERMISSION_LIFETIME - Duration::from_secs(1);
        assert!(permissions.contains_at(&peer, later));

        // a refresh pushes the horizon out again.
        permissions.insert(peer);
        let beyond = later + Duration::from_secs(30);
        assert!(permissions.contains_at(&peer, beyond));

        let expired = Instant::now() + PERMISSION_LIFETIME + Duration::from_secs(1);
        assert!(!permissions.contains_at(&peer, expired));
        assert_eq!(permissions.count(), 0);
    }
}
