use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::config::{Config, Interface};
use crate::turn::{five_tuple::Protocol, Service};

/// Start a UDP listener.
///
/// One ordered read loop per socket: datagrams from one client are
/// handed to the processor in arrival order, which is what keeps
/// requests on a five-tuple serialized.  Errors are logged and the loop
/// keeps reading.
pub async fn run(service: &Service, config: &Arc<Config>, interface: &Interface) -> anyhow::Result<()> {
    let socket = Arc::new(UdpSocket::bind(interface.bind).await?);
    let local = socket.local_addr()?;
    let mut processor =
        service.get_processor(socket.clone(), local, interface.external, Protocol::Udp);
    let mtu = config.turn.inbound_mtu;

    tokio::spawn(async move {
        let mut bytes = vec![0u8; mtu];

        loop {
            // TODO: the receive also fails when a previous send hit a
            // dead client (ICMP port unreachable); distinguishing that
            // from a listener-level fault would quiet the log.
            let (size, addr) = match socket.recv_from(&mut bytes).await {
                Ok(received) => received,
                Err(e) => {
                    log::warn!("udp socket receive error: {:?}", e);
                    continue;
                }
            };

            // the smallest TURN frame is a channel data header.
            if size < 4 {
                continue;
            }

            log::trace!("udp socket receive: size={}, addr={}", size, addr);

            if let Err(e) = processor.process(&bytes[..size], addr).await {
                log::warn!("failed to handle message: addr={}, err={}", addr, e);
            }
        }
    });

    log::info!("udp listener started: bind={}", local);
    Ok(())
}
