pub mod config;
pub mod observer;
pub mod server;
pub mod stun;
pub mod turn;

use std::sync::Arc;
use std::time::Duration;

use self::config::Config;
use self::turn::{relay::RelayAllocator, Options, Service};

/// In order to let the integration tests start the server exactly the
/// way the binary does, the bootstrap lives here instead of main.
/// Binds every configured listener and then parks for the life of the
/// process.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let service = Service::new(
        Options {
            realm: config.turn.realm.clone(),
            channel_bind_timeout: Duration::from_secs(config.turn.channel_bind_timeout),
            max_lifetime: Duration::from_secs(config.turn.max_lifetime),
        },
        observer::Observer::new(config.clone()),
        RelayAllocator {
            bind_ip: config.relay.bind_ip,
            min_port: config.relay.port_range[0],
            max_port: config.relay.port_range[1],
        },
    );

    server::run(config, &service).await?;

    std::future::pending::<()>().await;
    Ok(())
}
