use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use super::Allocation;
use crate::stun::Key;
use crate::turn::{
    five_tuple::FiveTuple, nonce::NonceStore, relay::RelayAddressGenerator, ClientConn, Error,
    Observer, Options,
};

/// A port held for EVEN-PORT with the R bit is redeemable for 30
/// seconds (RFC 5766 §14.2).
const RESERVATION_LIFETIME: Duration = Duration::from_secs(30);

/// The table of active allocations, indexed by five-tuple.
///
/// Creation, refresh and deletion all go through here; handlers only
/// ever hold the short-lived `Arc` they get back.  Expiry is enforced
/// lazily on access and by a periodic sweep.
pub struct Manager {
    allocations: RwLock<AHashMap<FiveTuple, Arc<Allocation>>>,
    reservations: Mutex<AHashMap<u64, (u16, Instant)>>,
    relay: Arc<dyn RelayAddressGenerator>,
    observer: Arc<dyn Observer>,
    options: Arc<Options>,
}

impl Manager {
    pub(crate) fn new(
        relay: Arc<dyn RelayAddressGenerator>,
        observer: Arc<dyn Observer>,
        options: Arc<Options>,
    ) -> Arc<Self> {
        Arc::new(Self {
            allocations: RwLock::new(AHashMap::with_capacity(1024)),
            reservations: Mutex::new(AHashMap::new()),
            relay,
            observer,
            options,
        })
    }

    /// Create an allocation for a five-tuple.
    ///
    /// Fails with an allocation mismatch when one is already live, and
    /// with insufficient capacity when the relay generator cannot bind
    /// a port.  `external` is the NAT-facing IP of the listener
    /// interface the request arrived on, advertised back in
    /// XOR-RELAYED-ADDRESS.  `even_port` carries the R bit of an
    /// EVEN-PORT request: `Some(true)` additionally reserves the
    /// next-higher port under a token the client can redeem in a later
    /// Allocate.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_allocation(
        &self,
        five_tuple: FiveTuple,
        conn: Arc<dyn ClientConn>,
        username: &str,
        key: Key,
        lifetime: Duration,
        external: IpAddr,
        requested_port: u16,
        even_port: Option<bool>,
    ) -> Result<Arc<Allocation>, Error> {
        if self.get_allocation(&five_tuple).is_some() {
            return Err(Error::AllocationMismatch);
        }

        let (socket, relay_addr, reservation_token) = match even_port {
            None => {
                let (socket, relay_addr) =
                    self.relay.allocate_socket(requested_port, external).await?;
                (socket, relay_addr, None)
            }
            Some(reserve) => {
                let mut bound = None;
                for _ in 0..128 {
                    let (socket, relay_addr) = self.relay.allocate_socket(0, external).await?;
                    if relay_addr.port() % 2 == 0 {
                        bound = Some((socket, relay_addr));
                        break;
                    }
                }

                let (socket, relay_addr) = bound.ok_or(Error::InsufficientCapacity)?;
                let token = reserve.then(|| {
                    let token = rand::random::<u64>();
                    self.reservations
                        .lock()
                        .insert(token, (relay_addr.port() + 1, Instant::now()));
                    token
                });

                (socket, relay_addr, token)
            }
        };

        let allocation = Arc::new(Allocation::new(
            five_tuple,
            socket,
            relay_addr,
            username.to_string(),
            key,
            lifetime,
            reservation_token,
        ));

        {
            // The relay bind awaited, so a concurrent Allocate on the
            // same five-tuple may have won in the meantime; the loser
            // gives its socket back.
            let mut index = self.allocations.write();
            if index.contains_key(&five_tuple) {
                return Err(Error::AllocationMismatch);
            }

            index.insert(five_tuple, allocation.clone());
        }

        allocation.start_pump(conn);
        log::info!(
            "allocation created: five_tuple={}, relay={}, username={}",
            five_tuple,
            relay_addr,
            username,
        );

        Ok(allocation)
    }

    /// The live allocation for a five-tuple, evicting it when its
    /// lifetime has run out.
    pub fn get_allocation(&self, five_tuple: &FiveTuple) -> Option<Arc<Allocation>> {
        let allocation = self.allocations.read().get(five_tuple).cloned()?;
        if allocation.is_expired() {
            self.delete_allocation(five_tuple);
            return None;
        }

        Some(allocation)
    }

    /// Refresh an allocation; a zero lifetime deletes it.  Returns
    /// false when no live allocation exists for the five-tuple.
    pub fn refresh_allocation(&self, five_tuple: &FiveTuple, lifetime: Duration) -> bool {
        if lifetime.is_zero() {
            return self.delete_allocation(five_tuple);
        }

        match self.get_allocation(five_tuple) {
            Some(allocation) => {
                allocation.refresh(lifetime);
                true
            }
            None => false,
        }
    }

    /// Remove an allocation and close its relay socket.  Idempotent.
    pub fn delete_allocation(&self, five_tuple: &FiveTuple) -> bool {
        let allocation = self.allocations.write().remove(five_tuple);
        match allocation {
            Some(allocation) => {
                allocation.close();
                self.observer.closed(five_tuple.src);
                log::info!("allocation removed: five_tuple={}", five_tuple);
                true
            }
            None => false,
        }
    }

    /// active allocation count, for tests and metrics.
    pub fn count(&self) -> usize {
        self.allocations.read().len()
    }

    /// redeem a reservation token for its held port.
    pub fn take_reservation(&self, token: u64) -> Option<u16> {
        let (port, reserved_at) = self.reservations.lock().remove(&token)?;
        (reserved_at.elapsed() < RESERVATION_LIFETIME).then_some(port)
    }

    /// Background eviction.
    ///
    /// Lazy checks on access keep the hot path honest; the sweeper
    /// catches allocations nobody touches anymore.  The interval is the
    /// greater of one minute and a quarter of the channel-bind timeout.
    pub(crate) fn start_sweeper(self: &Arc<Self>, nonces: Arc<NonceStore>) {
        let interval = Duration::from_secs(60).max(self.options.channel_bind_timeout / 4);
        let this = Arc::downgrade(self);

        std::thread::spawn(move || loop {
            std::thread::sleep(interval);

            let Some(manager) = this.upgrade() else {
                break;
            };

            manager.sweep(Instant::now());
            nonces.sweep();
        });
    }

    fn sweep(&self, now: Instant) {
        let expired: Vec<FiveTuple> = self
            .allocations
            .read()
            .iter()
            .filter(|(_, allocation)| allocation.expired_at(now))
            .map(|(five_tuple, _)| *five_tuple)
            .collect();

        for five_tuple in expired {
            // re-check under the write lock, a refresh may have raced
            // the collection above.
            let removed = {
                let mut index = self.allocations.write();
                match index.get(&five_tuple) {
                    Some(allocation) if allocation.expired_at(now) => index.remove(&five_tuple),
                    _ => None,
                }
            };

            if let Some(allocation) = removed {
                allocation.close();
                self.observer.closed(five_tuple.src);
                log::info!("allocation expired: five_tuple={}", five_tuple);
            }
        }

        self.reservations
            .lock()
            .retain(|_, (_, reserved_at)| now.duration_since(*reserved_at) < RESERVATION_LIFETIME);
    }
}
