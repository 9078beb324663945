use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::config::{Config, Interface};
use crate::stun::Decoder;
use crate::turn::{
    five_tuple::{FiveTuple, Protocol},
    ClientConn, Service,
};

// The write half of an accepted connection.  Responses and relayed
// peer data interleave on the stream, the mutex keeps frames whole.
struct TcpClient {
    writer: Mutex<OwnedWriteHalf>,
}

#[async_trait]
impl ClientConn for TcpClient {
    async fn send_to(&self, bytes: &[u8], _target: SocketAddr) -> std::io::Result<()> {
        self.writer.lock().await.write_all(bytes).await
    }
}

/// Start a TCP listener.
///
/// Each accepted connection gets its own task and processor.  The byte
/// stream is cut back into STUN messages and channel-data frames by
/// their length fields; channel data is padded to 4 bytes over TCP.
pub async fn run(service: &Service, config: &Arc<Config>, interface: &Interface) -> anyhow::Result<()> {
    let listener = TcpListener::bind(interface.bind).await?;
    let local = listener.local_addr()?;
    let external = interface.external;
    let mtu = config.turn.inbound_mtu;
    let service = service.clone();

    tokio::spawn(async move {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("tcp accept error: {:?}", e);
                    continue;
                }
            };

            log::info!("tcp connection accepted: addr={}", addr);
            tokio::spawn(handle_connection(
                service.clone(),
                local,
                external,
                stream,
                addr,
                mtu,
            ));
        }
    });

    log::info!("tcp listener started: bind={}", local);
    Ok(())
}

async fn handle_connection(
    service: Service,
    local: SocketAddr,
    external: SocketAddr,
    stream: TcpStream,
    addr: SocketAddr,
    mtu: usize,
) {
    let (mut reader, writer) = stream.into_split();
    let conn: Arc<dyn ClientConn> = Arc::new(TcpClient {
        writer: Mutex::new(writer),
    });

    let mut processor = service.get_processor(conn, local, external, Protocol::Tcp);
    let mut buffer = BytesMut::with_capacity(mtu * 2);

    'session: loop {
        match reader.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("tcp read error: addr={}, err={}", addr, e);
                break;
            }
        }

        // drain every complete frame the buffer holds.
        loop {
            if buffer.len() < 4 {
                break;
            }

            let size = match Decoder::message_size(&buffer, true) {
                Ok(size) => size,
                Err(e) => {
                    // framing on a stream cannot recover from garbage.
                    log::warn!("bad frame on tcp connection: addr={}, err={}", addr, e);
                    break 'session;
                }
            };

            if buffer.len() < size {
                break;
            }

            if let Err(e) = processor.process(&buffer[..size], addr).await {
                log::warn!("failed to handle message: addr={}, err={}", addr, e);
            }

            buffer.advance(size);
        }
    }

    // the allocation of a TCP client does not outlive its connection.
    service.get_manager().delete_allocation(&FiveTuple {
        src: addr,
        dst: local,
        protocol: Protocol::Tcp,
    });

    log::info!("tcp connection closed: addr={}", addr);
}
