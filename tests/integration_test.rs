use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

use turnd::{
    config::{Auth, Config, Interface, Log, Relay, Transport, Turn},
    startup,
    stun::{
        attribute::{
            ChannelNumber, Data, ErrorCode, ErrorKind, Fingerprint, Lifetime, Nonce, Realm,
            RequestedTransport, UserName, XorMappedAddress, XorPeerAddress, XorRelayedAddress,
            TRANSPORT_UDP,
        },
        method::*,
        util::long_term_credential_digest,
        ChannelData, Decoder, Key, MessageEncoder, MessageRef, Payload,
    },
};

async fn create_turn_server(bind: SocketAddr) -> Result<()> {
    let mut static_credentials = HashMap::new();
    static_credentials.insert("user".to_string(), "pass".to_string());

    tokio::spawn(async move {
        startup(Arc::new(Config {
            turn: Turn {
                realm: "pion.ly".to_string(),
                interfaces: vec![Interface {
                    transport: Transport::UDP,
                    bind,
                    external: bind,
                }],
                ..Turn::default()
            },
            relay: Relay::default(),
            log: Log::default(),
            auth: Auth { static_credentials },
        }))
        .await
        .unwrap();
    });

    sleep(Duration::from_millis(500)).await;
    Ok(())
}

fn auth_key() -> Key {
    long_term_credential_digest("user", "pion.ly", "pass")
}

struct Client {
    socket: UdpSocket,
    decoder: Decoder,
    token: [u8; 12],
    recv_bytes: [u8; 2048],
    send_bytes: BytesMut,
}

impl Client {
    async fn new(server: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        socket.connect(server).await?;

        Ok(Self {
            socket,
            decoder: Decoder::default(),
            token: [0u8; 12],
            recv_bytes: [0u8; 2048],
            send_bytes: BytesMut::with_capacity(2048),
        })
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    // every message goes out under a fresh transaction id.
    fn begin(&mut self, method: StunMethod) -> MessageEncoder<'_> {
        self.token = rand::random();
        MessageEncoder::new(method, &self.token, &mut self.send_bytes)
    }

    fn begin_channel_data(&mut self, number: u16, bytes: &[u8]) {
        ChannelData { number, bytes }.encode(&mut self.send_bytes);
    }

    async fn send(&self) -> Result<()> {
        self.socket.send(&self.send_bytes).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<MessageRef<'_>> {
        let size = timeout(Duration::from_secs(2), self.socket.recv(&mut self.recv_bytes)).await??;

        match self.decoder.decode(&self.recv_bytes[..size])? {
            Payload::Message(message) => Ok(message),
            Payload::ChannelData(_) => Err(anyhow!("expected a stun message")),
        }
    }

    async fn read_channel_data(&mut self) -> Result<ChannelData<'_>> {
        let size = timeout(Duration::from_secs(2), self.socket.recv(&mut self.recv_bytes)).await??;

        match self.decoder.decode(&self.recv_bytes[..size])? {
            Payload::ChannelData(data) => Ok(data),
            Payload::Message(_) => Err(anyhow!("expected channel data")),
        }
    }

    async fn expect_silence(&mut self) -> bool {
        timeout(Duration::from_millis(500), self.socket.recv(&mut self.recv_bytes))
            .await
            .is_err()
    }
}

// The 401 handshake followed by a signed Allocate; hands back the nonce
// for later signed requests and the relayed transport address.
async fn open_allocation(
    client: &mut Client,
    key: &Key,
    lifetime: Option<u32>,
) -> Result<(String, SocketAddr)> {
    let local_addr = client.local_addr()?;

    {
        let mut message = client.begin(ALLOCATE_REQUEST);
        message.append::<RequestedTransport>(TRANSPORT_UDP);
        message.flush(None)?;
    }
    client.send().await?;

    let nonce = {
        let message = client.read_message().await?;
        assert_eq!(message.method(), ALLOCATE_ERROR);

        let error = message.get::<ErrorCode>().expect("expected error code");
        assert_eq!(error.code, ErrorKind::Unauthorized as u16);
        assert_eq!(message.get::<Realm>(), Some("pion.ly"));

        let nonce = message.get::<Nonce>().expect("expected nonce");
        assert_eq!(nonce.len(), 32);
        nonce.to_string()
    };

    {
        let mut message = client.begin(ALLOCATE_REQUEST);
        message.append::<UserName>("user");
        message.append::<Realm>("pion.ly");
        message.append::<Nonce>(&nonce);
        message.append::<RequestedTransport>(TRANSPORT_UDP);
        if let Some(lifetime) = lifetime {
            message.append::<Lifetime>(lifetime);
        }

        message.flush(Some(key))?;
    }
    client.send().await?;

    let relay = {
        let message = client.read_message().await?;
        assert_eq!(message.method(), ALLOCATE_RESPONSE);

        let lifetime = message.get::<Lifetime>().expect("expected lifetime");
        assert!(lifetime > 0 && lifetime <= 3600);

        assert_eq!(message.get::<XorMappedAddress>(), Some(local_addr));

        message
            .get::<XorRelayedAddress>()
            .expect("expected relayed address")
    };

    Ok((nonce, relay))
}

#[tokio::test]
async fn binding_request() -> Result<()> {
    let bind = "127.0.0.1:34780".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    {
        let mut message = client.begin(BINDING_REQUEST);
        message.flush(None)?;
    }
    client.send().await?;

    let local_addr = client.local_addr()?;
    let message = client.read_message().await?;
    assert_eq!(message.method(), BINDING_RESPONSE);
    assert_eq!(message.get::<XorMappedAddress>(), Some(local_addr));
    assert!(message.get::<Fingerprint>().is_some());

    Ok(())
}

#[tokio::test]
async fn allocate_with_long_term_credentials() -> Result<()> {
    let bind = "127.0.0.1:34781".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    let (_, relay) = open_allocation(&mut client, &auth_key(), None).await?;
    assert_eq!(relay.ip().to_string(), "127.0.0.1");

    Ok(())
}

#[tokio::test]
async fn allocate_with_wrong_password_is_rejected() -> Result<()> {
    let bind = "127.0.0.1:34782".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    {
        let mut message = client.begin(ALLOCATE_REQUEST);
        message.append::<RequestedTransport>(TRANSPORT_UDP);
        message.flush(None)?;
    }
    client.send().await?;

    let nonce = {
        let message = client.read_message().await?;
        assert_eq!(message.method(), ALLOCATE_ERROR);
        message.get::<Nonce>().expect("expected nonce").to_string()
    };

    let wrong_key = long_term_credential_digest("user", "pion.ly", "wrong");
    {
        let mut message = client.begin(ALLOCATE_REQUEST);
        message.append::<UserName>("user");
        message.append::<Realm>("pion.ly");
        message.append::<Nonce>(&nonce);
        message.append::<RequestedTransport>(TRANSPORT_UDP);
        message.flush(Some(&wrong_key))?;
    }
    client.send().await?;

    let message = client.read_message().await?;
    assert_eq!(message.method(), ALLOCATE_ERROR);
    assert_eq!(
        message.get::<ErrorCode>().expect("expected error code").code,
        ErrorKind::BadRequest as u16,
    );

    Ok(())
}

// A requested lifetime above the server maximum comes back clamped.
#[tokio::test]
async fn allocation_lifetime_is_capped() -> Result<()> {
    let bind = "127.0.0.1:34783".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    let key = auth_key();

    {
        let mut message = client.begin(ALLOCATE_REQUEST);
        message.append::<RequestedTransport>(TRANSPORT_UDP);
        message.flush(None)?;
    }
    client.send().await?;

    let nonce = {
        let message = client.read_message().await?;
        message.get::<Nonce>().expect("expected nonce").to_string()
    };

    {
        let mut message = client.begin(ALLOCATE_REQUEST);
        message.append::<UserName>("user");
        message.append::<Realm>("pion.ly");
        message.append::<Nonce>(&nonce);
        message.append::<RequestedTransport>(TRANSPORT_UDP);
        message.append::<Lifetime>(7200);
        message.flush(Some(&key))?;
    }
    client.send().await?;

    let message = client.read_message().await?;
    assert_eq!(message.method(), ALLOCATE_RESPONSE);
    assert_eq!(message.get::<Lifetime>(), Some(3600));

    Ok(())
}

#[tokio::test]
async fn refresh_to_zero_deletes_the_allocation() -> Result<()> {
    let bind = "127.0.0.1:34784".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    let key = auth_key();
    let (nonce, _) = open_allocation(&mut client, &key, None).await?;

    for round in 0..2 {
        {
            let mut message = client.begin(REFRESH_REQUEST);
            message.append::<UserName>("user");
            message.append::<Realm>("pion.ly");
            message.append::<Nonce>(&nonce);
            message.append::<Lifetime>(0);
            message.flush(Some(&key))?;
        }
        client.send().await?;

        let message = client.read_message().await?;
        if round == 0 {
            // the first refresh deletes and reports a zero lifetime.
            assert_eq!(message.method(), REFRESH_RESPONSE);
            assert_eq!(message.get::<Lifetime>(), Some(0));
        } else {
            // the second one finds nothing: allocation mismatch.
            assert_eq!(message.method(), REFRESH_ERROR);
            assert_eq!(
                message.get::<ErrorCode>().expect("expected error code").code,
                ErrorKind::AllocationMismatch as u16,
            );
        }
    }

    Ok(())
}

#[tokio::test]
async fn channel_data_is_relayed_both_ways() -> Result<()> {
    let bind = "127.0.0.1:34785".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    let key = auth_key();
    let (nonce, relay) = open_allocation(&mut client, &key, None).await?;

    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;

    {
        let mut message = client.begin(CHANNEL_BIND_REQUEST);
        message.append::<UserName>("user");
        message.append::<Realm>("pion.ly");
        message.append::<Nonce>(&nonce);
        message.append::<ChannelNumber>(0x4000);
        message.append::<XorPeerAddress>(peer_addr);
        message.flush(Some(&key))?;
    }
    client.send().await?;

    {
        let message = client.read_message().await?;
        assert_eq!(message.method(), CHANNEL_BIND_RESPONSE);
    }

    // client -> peer through the channel.
    client.begin_channel_data(0x4000, b"Hello");
    client.send().await?;

    let mut bytes = [0u8; 2048];
    let (size, from) = timeout(Duration::from_secs(2), peer.recv_from(&mut bytes)).await??;
    assert_eq!(&bytes[..size], b"Hello");
    assert_eq!(from, relay);

    // peer -> client comes back framed on the same channel.
    peer.send_to(b"world", relay).await?;
    let data = client.read_channel_data().await?;
    assert_eq!(data.number, 0x4000);
    assert_eq!(data.bytes, b"world");

    // a channel nobody bound goes nowhere.
    client.begin_channel_data(0x4001, b"void");
    client.send().await?;
    assert!(client.expect_silence().await);

    Ok(())
}

#[tokio::test]
async fn permissions_gate_peer_traffic() -> Result<()> {
    let bind = "127.0.0.1:34786".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    let key = auth_key();
    let (nonce, relay) = open_allocation(&mut client, &key, None).await?;

    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;

    // without a permission the peer's datagram dies at the relay.
    peer.send_to(b"knock knock", relay).await?;
    assert!(client.expect_silence().await);

    {
        let mut message = client.begin(CREATE_PERMISSION_REQUEST);
        message.append::<UserName>("user");
        message.append::<Realm>("pion.ly");
        message.append::<Nonce>(&nonce);
        message.append::<XorPeerAddress>(peer_addr);
        message.flush(Some(&key))?;
    }
    client.send().await?;

    {
        let message = client.read_message().await?;
        assert_eq!(message.method(), CREATE_PERMISSION_RESPONSE);
    }

    // with the permission installed the datagram arrives as a Data
    // indication naming the peer.
    peer.send_to(b"hello relay", relay).await?;
    let message = client.read_message().await?;
    assert_eq!(message.method(), DATA_INDICATION);
    assert_eq!(message.get::<XorPeerAddress>(), Some(peer_addr));
    assert_eq!(message.get::<Data>(), Some(&b"hello relay"[..]));

    Ok(())
}

#[tokio::test]
async fn send_indication_reaches_permitted_peers() -> Result<()> {
    let bind = "127.0.0.1:34787".parse()?;
    create_turn_server(bind).await?;

    let mut client = Client::new(bind).await?;
    let key = auth_key();
    let (nonce, relay) = open_allocation(&mut client, &key, None).await?;

    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;

    {
        let mut message = client.begin(CREATE_PERMISSION_REQUEST);
        message.append::<UserName>("user");
        message.append::<Realm>("pion.ly");
        message.append::<Nonce>(&nonce);
        message.append::<XorPeerAddress>(peer_addr);
        message.flush(Some(&key))?;
    }
    client.send().await?;
    client.read_message().await?;

    {
        let mut message = client.begin(SEND_INDICATION);
        message.append::<XorPeerAddress>(peer_addr);
        message.append::<Data>(b"via indication");
        message.flush(None)?;
    }
    client.send().await?;

    let mut bytes = [0u8; 2048];
    let (size, from) = timeout(Duration::from_secs(2), peer.recv_from(&mut bytes)).await??;
    assert_eq!(&bytes[..size], b"via indication");
    assert_eq!(from, relay);

    Ok(())
}

// A truncated channel-data frame must be ignored without killing the
// listener.
#[tokio::test]
async fn partial_frames_are_rejected() -> Result<()> {
    let bind = "127.0.0.1:34788".parse()?;
    create_turn_server(bind).await?;

    let client = Client::new(bind).await?;
    client
        .socket
        .send(&[0x40, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00])
        .await?;

    // the server is still alive and answering.
    let mut client = client;
    {
        let mut message = client.begin(BINDING_REQUEST);
        message.flush(None)?;
    }
    client.send().await?;

    let message = client.read_message().await?;
    assert_eq!(message.method(), BINDING_RESPONSE);

    Ok(())
}
