use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::stun::{util::long_term_credential_digest, Key};
use crate::turn;

/// The server-side hook implementation.
///
/// Credentials come from the static table in the configuration; every
/// other hook just leaves a trace in the log.
pub struct Observer {
    config: Arc<Config>,
}

impl Observer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl turn::Observer for Observer {
    async fn auth(&self, username: &str, realm: &str, addr: SocketAddr) -> Option<Key> {
        let password = self.config.auth.static_credentials.get(username)?;
        log::info!("auth: username={}, realm={}, addr={}", username, realm, addr);
        Some(long_term_credential_digest(username, realm, password))
    }

    fn allocated(&self, addr: SocketAddr, username: &str, port: u16) {
        log::info!("allocated: addr={}, username={}, port={}", addr, username, port);
    }

    fn refreshed(&self, addr: SocketAddr, username: &str, lifetime: u32) {
        log::info!(
            "refreshed: addr={}, username={}, lifetime={}",
            addr,
            username,
            lifetime,
        );
    }

    fn permission_created(&self, addr: SocketAddr, username: &str, peer: IpAddr) {
        log::info!(
            "permission created: addr={}, username={}, peer={}",
            addr,
            username,
            peer,
        );
    }

    fn channel_bound(&self, addr: SocketAddr, username: &str, number: u16) {
        log::info!(
            "channel bound: addr={}, username={}, number={:#06x}",
            addr,
            username,
            number,
        );
    }

    fn closed(&self, addr: SocketAddr) {
        log::info!("closed: addr={}", addr);
    }
}
