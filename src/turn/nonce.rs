use std::fmt::Write;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use md5::{Digest, Md5};
use parking_lot::RwLock;

use crate::turn::Error;

/// A nonce is valid for one hour from issuance.
///
/// For each Allocate request, the server SHOULD generate a new random
/// nonce when the allocation is first attempted and SHOULD expire the
/// nonce at least once every hour during the lifetime of the allocation
/// (RFC 5766 §4).
pub const NONCE_LIFETIME: Duration = Duration::from_secs(3600);

/// Process-wide nonce table.
///
/// Maps every issued nonce to its issuance time.  Insertion has
/// load-or-store semantics so a generator collision is detected instead
/// of silently allowing reuse.  The store is owned by the service and
/// handed to every request, it is not a global.
pub struct NonceStore {
    map: RwLock<AHashMap<String, Instant>>,
}

impl Default for NonceStore {
    fn default() -> Self {
        Self {
            map: RwLock::new(AHashMap::with_capacity(1024)),
        }
    }
}

impl NonceStore {
    /// generate and register a fresh nonce.
    ///
    /// The value is the md5 of the current unix time concatenated with a
    /// random 64-bit integer, hex encoded: always 32 hex characters.
    pub fn generate(&self) -> Result<String, Error> {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|it| it.as_secs())
            .unwrap_or_default();

        let mut hasher = Md5::new();
        hasher.update(seconds.to_string());
        hasher.update(rand::random::<i64>().to_string());

        let mut nonce = String::with_capacity(32);
        for byte in hasher.finalize() {
            let _ = write!(&mut nonce, "{:02x}", byte);
        }

        let mut map = self.map.write();
        if map.contains_key(&nonce) {
            return Err(Error::DuplicatedNonce);
        }

        map.insert(nonce.clone(), Instant::now());
        Ok(nonce)
    }

    /// whether the nonce is known and not stale.
    ///
    /// A stale entry is removed on the way out, the caller is expected
    /// to challenge with a fresh nonce.
    pub fn verify(&self, nonce: &str) -> bool {
        self.verify_at(nonce, Instant::now())
    }

    fn verify_at(&self, nonce: &str, now: Instant) -> bool {
        let issued_at = match self.map.read().get(nonce) {
            Some(issued_at) => *issued_at,
            None => return false,
        };

        if now.duration_since(issued_at) >= NONCE_LIFETIME {
            self.map.write().remove(nonce);
            return false;
        }

        true
    }

    /// forget a nonce.
    pub fn remove(&self, nonce: &str) {
        self.map.write().remove(nonce);
    }

    /// drop every stale entry.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        self.map
            .write()
            .retain(|_, issued_at| now.duration_since(*issued_at) < NONCE_LIFETIME);
    }

    pub fn count(&self) -> usize {
        self.map.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_fixed_width_values() {
        let store = NonceStore::default();
        let nonce = store.generate().unwrap();

        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.verify(&nonce));
    }

    #[test]
    fn unknown_values_do_not_verify() {
        let store = NonceStore::default();
        assert!(!store.verify("7a70ab0866d2c70f15313b48155a4a23"));
    }

    #[test]
    fn uniqueness() {
        let store = NonceStore::default();
        for _ in 0..10_000 {
            store.generate().unwrap();
        }

        // a generator collision would have surfaced as an error; the
        // count doubles as a sanity check.
        assert_eq!(store.count(), 10_000);
    }

    #[test]
    fn staleness() {
        let store = NonceStore::default();
        let nonce = store.generate().unwrap();

        let future = Instant::now() + NONCE_LIFETIME + Duration::from_secs(1);
        assert!(!store.verify_at(&nonce, future));

        // verification of a stale entry deletes it.
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let store = NonceStore::default();
        store.generate().unwrap();
        store.generate().unwrap();

        store.sweep_at(Instant::now());
        assert_eq!(store.count(), 2);

        store.sweep_at(Instant::now() + NONCE_LIFETIME + Duration::from_secs(1));
        assert_eq!(store.count(), 0);
    }
}
