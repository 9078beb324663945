mod tcp;
mod udp;

use std::sync::Arc;

use crate::config::{Config, Transport};
use crate::turn::Service;

/// Bring up one listener per configured interface.
///
/// Listeners run as background tasks; this returns once they are all
/// bound so the caller can decide how to park the process.
pub async fn run(config: Arc<Config>, service: &Service) -> anyhow::Result<()> {
    for interface in &config.turn.interfaces {
        match interface.transport {
            Transport::UDP => udp::run(service, &config, interface).await?,
            Transport::TCP => tcp::run(service, &config, interface).await?,
        }
    }

    log::info!(
        "turn server running: realm={}, interfaces={}",
        config.turn.realm,
        config.turn.interfaces.len(),
    );

    Ok(())
}
