pub mod allocate;
pub mod binding;
pub mod channel_bind;
pub mod channel_data;
pub mod create_permission;
pub mod indication;
pub mod refresh;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::stun::{
    attribute::{
        self, AttrKind, ErrorCode, ErrorKind, Lifetime, MessageIntegrity, Nonce, Realm, Software,
        UserName,
    },
    method::*,
    util, Decoder, Key, MessageEncoder, MessageRef, Payload, StunError, COOKIE,
};
use crate::turn::{
    allocation::{manager::Manager, DEFAULT_LIFETIME},
    five_tuple::{FiveTuple, Protocol},
    nonce::NonceStore,
    ClientConn, Error, Observer, Options, SOFTWARE,
};

/// Shared state every request sees.
pub struct Env {
    pub options: Arc<Options>,
    pub manager: Arc<Manager>,
    pub nonces: Arc<NonceStore>,
    pub observer: Arc<dyn Observer>,
}

/// A single incoming datagram on its way through the server.
///
/// Carries the source, the listener connection the reply goes out on,
/// the shared state, and the per-processor encode buffer.
pub struct Request<'a> {
    pub env: &'a Env,
    pub conn: &'a Arc<dyn ClientConn>,
    pub five_tuple: FiveTuple,
    /// the advertised (NAT-facing) address of the listener interface.
    pub external: SocketAddr,
    pub bytes: &'a mut BytesMut,
}

impl Request<'_> {
    pub(crate) fn src(&self) -> SocketAddr {
        self.five_tuple.src
    }

    pub(crate) async fn send(&self) -> Result<(), Error> {
        self.conn.send_to(self.bytes.as_ref(), self.five_tuple.src).await?;
        Ok(())
    }

    /// The long-term credential check every authenticated method runs
    /// (RFC 5389 §10.2, RFC 5766 §4).
    ///
    /// * no MESSAGE-INTEGRITY: answer 401 with a fresh NONCE and the
    ///   REALM, the client retries with credentials;
    /// * unknown or stale NONCE: answer 438 with a fresh NONCE;
    /// * missing NONCE/REALM/USERNAME, unknown user, or a failed
    ///   integrity check: answer 400.
    ///
    /// `Ok(None)` means a challenge went out and the request is done;
    /// `Ok(Some(_))` hands the handler the username and the key that
    /// verified, which also signs the response.
    pub(crate) async fn authenticate<'m>(
        &mut self,
        message: &MessageRef<'m>,
        method: StunMethod,
    ) -> Result<Option<(&'m str, Key)>, Error> {
        if message.get::<MessageIntegrity>().is_none() {
            self.challenge(message, method, ErrorKind::Unauthorized).await?;
            return Ok(None);
        }

        let Some(nonce) = message.get::<Nonce>() else {
            self.reject(message, method, ErrorKind::BadRequest, None).await?;
            return Err(Error::MissingNonce);
        };

        if !self.env.nonces.verify(nonce) {
            self.env.nonces.remove(nonce);
            self.challenge(message, method, ErrorKind::StaleNonce).await?;
            return Ok(None);
        }

        let Some(realm) = message.get::<Realm>() else {
            self.reject(message, method, ErrorKind::BadRequest, None).await?;
            return Err(Error::MissingRealm);
        };

        let Some(username) = message.get::<UserName>() else {
            self.reject(message, method, ErrorKind::BadRequest, None).await?;
            return Err(Error::MissingUsername);
        };

        let Some(key) = self
            .env
            .observer
            .auth(username, realm, self.five_tuple.src)
            .await
        else {
            self.reject(message, method, ErrorKind::BadRequest, None).await?;
            return Err(Error::NoSuchUser(username.to_string()));
        };

        if let Err(e) = message.integrity(&key) {
            self.reject(message, method, ErrorKind::BadRequest, None).await?;
            return Err(e.into());
        }

        Ok(Some((username, key)))
    }

    // An authentication challenge: the error code plus a freshly minted
    // NONCE and the REALM.  Challenges are never signed, the client has
    // not proven anything yet.
    pub(crate) async fn challenge(
        &mut self,
        message: &MessageRef<'_>,
        method: StunMethod,
        kind: ErrorKind,
    ) -> Result<(), Error> {
        let Some(method) = method.error() else {
            return Ok(());
        };

        let nonce = self.env.nonces.generate()?;

        {
            let mut pack = MessageEncoder::extend(method, message, self.bytes);
            pack.append::<ErrorCode>(attribute::Error::from(kind));
            pack.append::<Realm>(&self.env.options.realm);
            pack.append::<Nonce>(&nonce);
            pack.flush(None)?;
        }

        self.send().await
    }

    /// An error reply carrying the transaction id of the request.  When
    /// the request passed authentication the reply is signed with the
    /// same key.
    pub(crate) async fn reject(
        &mut self,
        message: &MessageRef<'_>,
        method: StunMethod,
        kind: ErrorKind,
        key: Option<&Key>,
    ) -> Result<(), Error> {
        let Some(method) = method.error() else {
            return Ok(());
        };

        {
            let mut pack = MessageEncoder::extend(method, message, self.bytes);
            pack.append::<ErrorCode>(attribute::Error::from(kind));
            pack.append::<Software>(SOFTWARE);
            pack.flush(key)?;
        }

        self.send().await
    }

    // 400 for a request whose method the registry does not know.  Built
    // by hand because the typed encoder only speaks known methods; the
    // transaction id is still echoed so the client can correlate.
    pub(crate) async fn reply_unknown_method(
        &mut self,
        method: u16,
        token: &[u8],
    ) -> Result<(), Error> {
        let reason: &str = ErrorKind::BadRequest.into();

        self.bytes.clear();
        self.bytes.put_u16(method | 0x0110);
        self.bytes.put_u16(0);
        self.bytes.put(&COOKIE[..]);
        self.bytes.put(token);

        self.bytes.put_u16(AttrKind::ErrorCode as u16);
        self.bytes.put_u16((4 + reason.len()) as u16);
        self.bytes.put_u16(0);
        self.bytes.put_u16(ErrorKind::BadRequest as u16);
        self.bytes.put(reason.as_bytes());

        let pad = util::pad_size(reason.len());
        if pad > 0 {
            self.bytes.put_bytes(0, pad);
        }

        let len = (self.bytes.len() - 20) as u16;
        self.bytes[2..4].copy_from_slice(&len.to_be_bytes());

        self.send().await
    }
}

/// The desired lifetime of an allocation.
///
/// The minimum of the client's requested lifetime and the server's
/// maximum; the default when the request does not say.
pub(crate) fn requested_lifetime(message: &MessageRef<'_>, options: &Options) -> Duration {
    match message.get::<Lifetime>() {
        Some(seconds) => options.max_lifetime.min(Duration::from_secs(seconds as u64)),
        None => DEFAULT_LIFETIME,
    }
}

/// Per-listener message processor.
///
/// Classifies each datagram, decodes it and routes it to the method
/// handler; never holds the listener longer than one message's
/// processing.  Errors bubble back to the listener, which logs and
/// keeps reading.
pub struct Processor {
    env: Env,
    conn: Arc<dyn ClientConn>,
    interface: SocketAddr,
    external: SocketAddr,
    protocol: Protocol,
    decoder: Decoder,
    bytes: BytesMut,
}

impl Processor {
    pub(crate) fn new(
        env: Env,
        conn: Arc<dyn ClientConn>,
        interface: SocketAddr,
        external: SocketAddr,
        protocol: Protocol,
    ) -> Self {
        Self {
            env,
            conn,
            interface,
            external,
            protocol,
            decoder: Decoder::default(),
            bytes: BytesMut::with_capacity(4096),
        }
    }

    /// Handle one datagram from `src`.
    ///
    /// | class      | method           | auth               |
    /// |------------|------------------|--------------------|
    /// | request    | Binding          | no                 |
    /// | request    | Allocate         | yes                |
    /// | request    | Refresh          | yes                |
    /// | request    | CreatePermission | yes                |
    /// | request    | ChannelBind      | yes                |
    /// | indication | Send             | via permission     |
    /// | -          | ChannelData      | via channel table  |
    pub async fn process(&mut self, bytes: &[u8], src: SocketAddr) -> Result<(), Error> {
        let five_tuple = FiveTuple {
            src,
            dst: self.interface,
            protocol: self.protocol,
        };

        match self.decoder.decode(bytes) {
            Ok(Payload::ChannelData(data)) => {
                let req = Request {
                    env: &self.env,
                    conn: &self.conn,
                    five_tuple,
                    external: self.external,
                    bytes: &mut self.bytes,
                };

                channel_data::process(req, data).await
            }
            Ok(Payload::Message(message)) => {
                let req = Request {
                    env: &self.env,
                    conn: &self.conn,
                    five_tuple,
                    external: self.external,
                    bytes: &mut self.bytes,
                };

                match message.method() {
                    BINDING_REQUEST => binding::process(req, &message).await,
                    ALLOCATE_REQUEST => allocate::process(req, &message).await,
                    CREATE_PERMISSION_REQUEST => create_permission::process(req, &message).await,
                    CHANNEL_BIND_REQUEST => channel_bind::process(req, &message).await,
                    REFRESH_REQUEST => refresh::process(req, &message).await,
                    SEND_INDICATION => indication::process(req, &message).await,
                    other => Err(Error::UnhandledMessage(other.into())),
                }
            }
            Err(StunError::UnknownMethod(value)) => {
                // an unknown method in the request class still deserves
                // a 400; indications and responses are dropped.
                if value & 0x0110 == 0 && bytes.len() >= 20 && bytes[4..8] == COOKIE[..] {
                    let mut req = Request {
                        env: &self.env,
                        conn: &self.conn,
                        five_tuple,
                        external: self.external,
                        bytes: &mut self.bytes,
                    };

                    req.reply_unknown_method(value, &bytes[8..20]).await?;
                }

                Err(Error::UnhandledMessage(value))
            }
            Err(e) => Err(e.into()),
        }
    }
}
