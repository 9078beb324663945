use std::collections::HashMap;
use std::fs::read_to_string;
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    TCP,
    UDP,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Interface {
    pub transport: Transport,
    /// turn server listen address
    pub bind: SocketAddr,
    /// external address
    ///
    /// specify the interface external address and port.  for the case
    /// of exposing the service to the outside, you need to manually
    /// specify the NAT-facing IP address here; relayed transport
    /// addresses allocated through this interface advertise the same
    /// IP.
    pub external: SocketAddr,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Turn {
    /// turn server realm
    ///
    /// specify the realm the server answers challenges with; the same
    /// string goes into the long-term credential digest, so clients and
    /// server must agree on it.
    #[serde(default = "Turn::realm")]
    pub realm: String,

    /// turn server listen interfaces
    ///
    /// The addresses and ports the server is bound to.  Multiple
    /// interfaces can be bound at the same time, mixing udp and tcp.
    #[serde(default = "Turn::interfaces")]
    pub interfaces: Vec<Interface>,

    /// channel binding lifetime, in seconds
    ///
    /// ten minutes per RFC 5766 unless overridden; the eviction sweep
    /// interval follows this value.
    #[serde(default = "Turn::channel_bind_timeout")]
    pub channel_bind_timeout: u64,

    /// allocation lifetime cap, in seconds
    ///
    /// requested lifetimes above this are clamped; one hour per the
    /// RFC 5766 recommendation.
    #[serde(default = "Turn::max_lifetime")]
    pub max_lifetime: u64,

    /// inbound read buffer size, in bytes
    #[serde(default = "Turn::inbound_mtu")]
    pub inbound_mtu: usize,
}

impl Turn {
    fn realm() -> String {
        "localhost".to_string()
    }

    fn interfaces() -> Vec<Interface> {
        vec![]
    }

    fn channel_bind_timeout() -> u64 {
        600
    }

    fn max_lifetime() -> u64 {
        3600
    }

    fn inbound_mtu() -> usize {
        1500
    }
}

impl Default for Turn {
    fn default() -> Self {
        Self {
            realm: Self::realm(),
            interfaces: Self::interfaces(),
            channel_bind_timeout: Self::channel_bind_timeout(),
            max_lifetime: Self::max_lifetime(),
            inbound_mtu: Self::inbound_mtu(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Relay {
    /// where relay sockets bind
    ///
    /// the ip written into XOR-RELAYED-ADDRESS comes from the external
    /// address of the interface the allocation was created through,
    /// not from here.
    #[serde(default = "Relay::bind_ip")]
    pub bind_ip: IpAddr,

    /// relay port range, inclusive
    #[serde(default = "Relay::port_range")]
    pub port_range: [u16; 2],
}

impl Relay {
    fn bind_ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    fn port_range() -> [u16; 2] {
        [49152, 65535]
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            bind_ip: Self::bind_ip(),
            port_range: Self::port_range(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Log {
    /// log level
    ///
    /// An enum representing the available verbosity levels of the logger.
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Auth {
    /// static user password table
    ///
    /// the long-term credentials the server accepts; the HMAC key is
    /// derived as MD5(username:realm:password).
    #[serde(default)]
    pub static_credentials: HashMap<String, String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub turn: Turn,
    #[serde(default)]
    pub relay: Relay,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub auth: Auth,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// specify the configuration file path.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    /// Load command line parameters, if the configuration file path is
    /// specified, the configuration is read from the configuration
    /// file, otherwise the default configuration is used.
    pub fn load() -> anyhow::Result<Self> {
        Ok(toml::from_str(
            &Cli::parse()
                .config
                .and_then(|path| read_to_string(path).ok())
                .unwrap_or_default(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.turn.realm, "localhost");
        assert_eq!(config.turn.channel_bind_timeout, 600);
        assert_eq!(config.turn.max_lifetime, 3600);
        assert_eq!(config.turn.inbound_mtu, 1500);
        assert_eq!(config.relay.port_range, [49152, 65535]);
        assert!(config.auth.static_credentials.is_empty());
    }

    #[test]
    fn full_file() {
        let config: Config = toml::from_str(
            r#"
            [turn]
            realm = "pion.ly"
            interfaces = [
                { transport = "udp", bind = "0.0.0.0:3478", external = "1.2.3.4:3478" },
                { transport = "tcp", bind = "0.0.0.0:3478", external = "1.2.3.4:3478" },
            ]

            [relay]
            bind_ip = "0.0.0.0"
            port_range = [50000, 51000]

            [auth.static_credentials]
            user = "pass"
            "#,
        )
        .unwrap();

        assert_eq!(config.turn.realm, "pion.ly");
        assert_eq!(config.turn.interfaces.len(), 2);
        assert_eq!(config.turn.interfaces[0].transport, Transport::UDP);
        assert_eq!(config.turn.interfaces[0].external.ip().to_string(), "1.2.3.4");
        assert_eq!(config.relay.port_range, [50000, 51000]);
        assert_eq!(config.auth.static_credentials["user"], "pass");
    }
}
