//! ## Session Traversal Utilities for NAT (STUN)
//!
//! [RFC8489]: https://tools.ietf.org/html/rfc8489
//! [RFC5766]: https://tools.ietf.org/html/rfc5766
//!
//! ### STUN Message Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! |                     Transaction ID (96 bits)                  |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ### STUN Attributes
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Type                  |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Value (variable)                ....
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! TURN is an extension to STUN: all TURN messages, with the exception of
//! the ChannelData message, are STUN-formatted messages [RFC5766]. The
//! first two bits of every frame select the framing: `00` is a STUN
//! message, `01` is channel data, and everything else is not TURN.

pub mod attribute;
pub mod channel;
pub mod message;
pub mod util;

pub use self::{attribute::AttrKind, channel::ChannelData, message::*};

use std::ops::Range;

use thiserror::Error;

/// STUN magic cookie, fixed for all messages.
pub const COOKIE: [u8; 4] = 0x2112A442u32.to_be_bytes();

/// 16-byte long-term credential key, `MD5(username:realm:password)`.
pub type Key = [u8; 16];

#[derive(Debug, Error)]
pub enum StunError {
    #[error("invalid input")]
    InvalidInput,
    #[error("unhandled frame")]
    UnhandledFrame,
    #[error("incomplete TURN frame")]
    IncompleteFrame,
    #[error("channel number out of range")]
    BadChannelNumber,
    #[error("summary failed")]
    SummaryFailed,
    #[error("missing message integrity")]
    NotFoundIntegrity,
    #[error("integrity check failed")]
    IntegrityFailed,
    #[error("missing magic cookie")]
    NotFoundCookie,
    #[error("unknown stun method: {0:#06x}")]
    UnknownMethod(u16),
    #[error("Utf8Error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
    #[error("TryFromSliceError: {0}")]
    TryFromSliceError(#[from] std::array::TryFromSliceError),
}

#[rustfmt::skip]
pub mod method {
    use super::StunError;

    pub const BINDING_REQUEST: StunMethod = StunMethod::Binding(StunMethodKind::Request);
    pub const BINDING_RESPONSE: StunMethod = StunMethod::Binding(StunMethodKind::Response);
    pub const BINDING_ERROR: StunMethod = StunMethod::Binding(StunMethodKind::Error);
    pub const ALLOCATE_REQUEST: StunMethod = StunMethod::Allocate(StunMethodKind::Request);
    pub const ALLOCATE_RESPONSE: StunMethod = StunMethod::Allocate(StunMethodKind::Response);
    pub const ALLOCATE_ERROR: StunMethod = StunMethod::Allocate(StunMethodKind::Error);
    pub const CREATE_PERMISSION_REQUEST: StunMethod = StunMethod::CreatePermission(StunMethodKind::Request);
    pub const CREATE_PERMISSION_RESPONSE: StunMethod = StunMethod::CreatePermission(StunMethodKind::Response);
    pub const CREATE_PERMISSION_ERROR: StunMethod = StunMethod::CreatePermission(StunMethodKind::Error);
    pub const CHANNEL_BIND_REQUEST: StunMethod = StunMethod::ChannelBind(StunMethodKind::Request);
    pub const CHANNEL_BIND_RESPONSE: StunMethod = StunMethod::ChannelBind(StunMethodKind::Response);
    pub const CHANNEL_BIND_ERROR: StunMethod = StunMethod::ChannelBind(StunMethodKind::Error);
    pub const REFRESH_REQUEST: StunMethod = StunMethod::Refresh(StunMethodKind::Request);
    pub const REFRESH_RESPONSE: StunMethod = StunMethod::Refresh(StunMethodKind::Response);
    pub const REFRESH_ERROR: StunMethod = StunMethod::Refresh(StunMethodKind::Error);
    pub const SEND_INDICATION: StunMethod = StunMethod::SendIndication;
    pub const DATA_INDICATION: StunMethod = StunMethod::DataIndication;

    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub enum StunMethodKind {
        Request,
        Response,
        Error,
    }

    /// STUN Methods Registry
    ///
    /// [RFC5389]: https://datatracker.ietf.org/doc/html/rfc5389
    /// [RFC5766]: https://datatracker.ietf.org/doc/html/rfc5766
    ///
    /// A STUN method is a hex number in the range 0x000-0x0FF.  The class
    /// of a message is interleaved with the method over the message type
    /// field, carried in the two bits 0x0100 and 0x0010.
    ///
    /// 0x001: Binding
    /// 0x003: Allocate
    /// 0x004: Refresh
    /// 0x006: Send
    /// 0x007: Data
    /// 0x008: CreatePermission
    /// 0x009: ChannelBind
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub enum StunMethod {
        Binding(StunMethodKind),
        Allocate(StunMethodKind),
        CreatePermission(StunMethodKind),
        ChannelBind(StunMethodKind),
        Refresh(StunMethodKind),
        SendIndication,
        DataIndication,
    }

    impl StunMethod {
        /// the error response counterpart of a method, if it has one.
        pub fn error(self) -> Option<StunMethod> {
            Some(match self {
                Self::Binding(_) => Self::Binding(StunMethodKind::Error),
                Self::Allocate(_) => Self::Allocate(StunMethodKind::Error),
                Self::CreatePermission(_) => Self::CreatePermission(StunMethodKind::Error),
                Self::ChannelBind(_) => Self::ChannelBind(StunMethodKind::Error),
                Self::Refresh(_) => Self::Refresh(StunMethodKind::Error),
                Self::SendIndication | Self::DataIndication => return None,
            })
        }

        /// whether the method is a request that expects a reply.
        pub fn is_request(self) -> bool {
            matches!(
                self,
                Self::Binding(StunMethodKind::Request)
                    | Self::Allocate(StunMethodKind::Request)
                    | Self::CreatePermission(StunMethodKind::Request)
                    | Self::ChannelBind(StunMethodKind::Request)
                    | Self::Refresh(StunMethodKind::Request)
            )
        }
    }

    impl TryFrom<u16> for StunMethod {
        type Error = StunError;

        /// # Test
        ///
        /// ```
        /// use turnd::stun::method::*;
        ///
        /// assert_eq!(StunMethod::try_from(0x0001).unwrap(), BINDING_REQUEST);
        /// assert_eq!(StunMethod::try_from(0x0101).unwrap(), BINDING_RESPONSE);
        /// assert_eq!(StunMethod::try_from(0x0111).unwrap(), BINDING_ERROR);
        /// assert_eq!(StunMethod::try_from(0x0003).unwrap(), ALLOCATE_REQUEST);
        /// assert_eq!(StunMethod::try_from(0x0103).unwrap(), ALLOCATE_RESPONSE);
        /// assert_eq!(StunMethod::try_from(0x0113).unwrap(), ALLOCATE_ERROR);
        /// assert_eq!(StunMethod::try_from(0x0016).unwrap(), SEND_INDICATION);
        /// assert_eq!(StunMethod::try_from(0x0017).unwrap(), DATA_INDICATION);
        /// assert!(StunMethod::try_from(0x0050).is_err());
        /// ```
        fn try_from(value: u16) -> Result<Self, StunError> {
            Ok(match value {
                0x0001 => Self::Binding(StunMethodKind::Request),
                0x0101 => Self::Binding(StunMethodKind::Response),
                0x0111 => Self::Binding(StunMethodKind::Error),
                0x0003 => Self::Allocate(StunMethodKind::Request),
                0x0103 => Self::Allocate(StunMethodKind::Response),
                0x0113 => Self::Allocate(StunMethodKind::Error),
                0x0008 => Self::CreatePermission(StunMethodKind::Request),
                0x0108 => Self::CreatePermission(StunMethodKind::Response),
                0x0118 => Self::CreatePermission(StunMethodKind::Error),
                0x0009 => Self::ChannelBind(StunMethodKind::Request),
                0x0109 => Self::ChannelBind(StunMethodKind::Response),
                0x0119 => Self::ChannelBind(StunMethodKind::Error),
                0x0004 => Self::Refresh(StunMethodKind::Request),
                0x0104 => Self::Refresh(StunMethodKind::Response),
                0x0114 => Self::Refresh(StunMethodKind::Error),
                0x0016 => Self::SendIndication,
                0x0017 => Self::DataIndication,
                _ => return Err(StunError::UnknownMethod(value)),
            })
        }
    }

    impl From<StunMethod> for u16 {
        fn from(value: StunMethod) -> Self {
            match value {
                StunMethod::Binding(StunMethodKind::Request) => 0x0001,
                StunMethod::Binding(StunMethodKind::Response) => 0x0101,
                StunMethod::Binding(StunMethodKind::Error) => 0x0111,
                StunMethod::Allocate(StunMethodKind::Request) => 0x0003,
                StunMethod::Allocate(StunMethodKind::Response) => 0x0103,
                StunMethod::Allocate(StunMethodKind::Error) => 0x0113,
                StunMethod::CreatePermission(StunMethodKind::Request) => 0x0008,
                StunMethod::CreatePermission(StunMethodKind::Response) => 0x0108,
                StunMethod::CreatePermission(StunMethodKind::Error) => 0x0118,
                StunMethod::ChannelBind(StunMethodKind::Request) => 0x0009,
                StunMethod::ChannelBind(StunMethodKind::Response) => 0x0109,
                StunMethod::ChannelBind(StunMethodKind::Error) => 0x0119,
                StunMethod::Refresh(StunMethodKind::Request) => 0x0004,
                StunMethod::Refresh(StunMethodKind::Response) => 0x0104,
                StunMethod::Refresh(StunMethodKind::Error) => 0x0114,
                StunMethod::SendIndication => 0x0016,
                StunMethod::DataIndication => 0x0017,
            }
        }
    }
}

#[derive(Debug)]
pub enum Payload<'a> {
    Message(MessageRef<'a>),
    ChannelData(ChannelData<'a>),
}

/// A cache of the list of attributes, this is for internal use only.
#[derive(Debug, Clone)]
pub struct Attributes(Vec<(AttrKind, Range<usize>)>);

impl Default for Attributes {
    fn default() -> Self {
        Self(Vec::with_capacity(20))
    }
}

impl Attributes {
    /// Adds an attribute to the list.
    pub fn append(&mut self, kind: AttrKind, range: Range<usize>) {
        self.0.push((kind, range));
    }

    /// Gets an attribute from the list.
    ///
    /// Note: This function will only look for the first matching attribute
    /// in the list and return it.
    pub fn get(&self, kind: AttrKind) -> Option<Range<usize>> {
        self.0.iter().find(|(k, _)| *k == kind).map(|(_, v)| v.clone())
    }

    /// Gets all the values of an attribute from the list.
    ///
    /// A stun message can carry multiple attributes of the same type, this
    /// function returns all of them in order.
    pub fn get_all(&self, kind: AttrKind) -> impl Iterator<Item = &Range<usize>> {
        self.0.iter().filter(move |(k, _)| *k == kind).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        if !self.0.is_empty() {
            self.0.clear();
        }
    }
}

/// Frame classifier.
#[derive(Default)]
pub struct Decoder(Attributes);

impl Decoder {
    /// # Test
    ///
    /// ```
    /// use turnd::stun::attribute::*;
    /// use turnd::stun::*;
    ///
    /// let buffer = [
    ///     0x00, 0x01, 0x00, 0x4c, 0x21, 0x12, 0xa4, 0x42, 0x71, 0x66, 0x46, 0x31,
    ///     0x2b, 0x59, 0x79, 0x65, 0x56, 0x69, 0x32, 0x72, 0x00, 0x06, 0x00, 0x09,
    ///     0x55, 0x43, 0x74, 0x39, 0x3a, 0x56, 0x2f, 0x2b, 0x2f, 0x00, 0x00, 0x00,
    ///     0xc0, 0x57, 0x00, 0x04, 0x00, 0x00, 0x03, 0xe7, 0x80, 0x29, 0x00, 0x08,
    ///     0x22, 0x49, 0xda, 0x28, 0x2c, 0x6f, 0x2e, 0xdb, 0x00, 0x24, 0x00, 0x04,
    ///     0x6e, 0x00, 0x28, 0xff, 0x00, 0x08, 0x00, 0x14, 0x19, 0x58, 0xda, 0x38,
    ///     0xed, 0x1e, 0xdd, 0xc8, 0x6b, 0x8e, 0x22, 0x63, 0x3a, 0x22, 0x63, 0x97,
    ///     0xcf, 0xf5, 0xde, 0x82, 0x80, 0x28, 0x00, 0x04, 0x56, 0xf7, 0xa3, 0xed,
    /// ];
    ///
    /// let mut decoder = Decoder::default();
    /// let payload = decoder.decode(&buffer).unwrap();
    /// if let Payload::Message(message) = payload {
    ///     assert!(message.get::<UserName>().is_some())
    /// }
    /// ```
    pub fn decode<'a>(&'a mut self, bytes: &'a [u8]) -> Result<Payload<'a>, StunError> {
        if bytes.len() < 4 {
            return Err(StunError::InvalidInput);
        }

        match bytes[0] >> 6 {
            0 => {
                self.0.clear();

                Ok(Payload::Message(MessageRef::decode(bytes, &mut self.0)?))
            }
            1 => Ok(Payload::ChannelData(ChannelData::try_from(bytes)?)),
            _ => Err(StunError::UnhandledFrame),
        }
    }

    /// The total size of the next frame in the buffer, for transports that
    /// deliver a byte stream. Channel data is padded to 4 bytes over TCP.
    ///
    /// # Test
    ///
    /// ```
    /// use turnd::stun::Decoder;
    ///
    /// let buffer = [0x40u8, 0x00, 0x00, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
    ///
    /// assert_eq!(Decoder::message_size(&buffer, false).unwrap(), 9);
    /// assert_eq!(Decoder::message_size(&buffer, true).unwrap(), 12);
    /// ```
    pub fn message_size(bytes: &[u8], is_tcp: bool) -> Result<usize, StunError> {
        if bytes.len() < 4 {
            return Err(StunError::InvalidInput);
        }

        match bytes[0] >> 6 {
            0 => MessageRef::message_size(bytes),
            1 => ChannelData::message_size(bytes, is_tcp),
            _ => Err(StunError::UnhandledFrame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::method::*;
    use super::*;

    use bytes::BytesMut;

    const METHODS: [StunMethod; 17] = [
        BINDING_REQUEST,
        BINDING_RESPONSE,
        BINDING_ERROR,
        ALLOCATE_REQUEST,
        ALLOCATE_RESPONSE,
        ALLOCATE_ERROR,
        CREATE_PERMISSION_REQUEST,
        CREATE_PERMISSION_RESPONSE,
        CREATE_PERMISSION_ERROR,
        CHANNEL_BIND_REQUEST,
        CHANNEL_BIND_RESPONSE,
        CHANNEL_BIND_ERROR,
        REFRESH_REQUEST,
        REFRESH_RESPONSE,
        REFRESH_ERROR,
        SEND_INDICATION,
        DATA_INDICATION,
    ];

    #[test]
    fn method_roundtrip() {
        for method in METHODS {
            let value: u16 = method.into();
            assert_eq!(StunMethod::try_from(value).unwrap(), method);
        }
    }

    // Building a message with a random transaction id for every method and
    // parsing it back must yield identical field values.
    #[test]
    fn message_roundtrip() {
        let mut bytes = BytesMut::with_capacity(1280);

        for method in METHODS {
            let token: [u8; 12] = rand::random();
            {
                let mut message = MessageEncoder::new(method, &token, &mut bytes);
                message.flush(None).unwrap();
            }

            let mut decoder = Decoder::default();
            match decoder.decode(&bytes).unwrap() {
                Payload::Message(message) => {
                    assert_eq!(message.method(), method);
                    assert_eq!(message.token(), token.as_slice());
                }
                _ => panic!("expected a stun message"),
            }
        }
    }

    #[test]
    fn rejects_non_turn_prefixes() {
        let mut decoder = Decoder::default();
        assert!(matches!(
            decoder.decode(&[0x80, 0x00, 0x00, 0x00]),
            Err(StunError::UnhandledFrame)
        ));

        let mut decoder = Decoder::default();
        assert!(matches!(
            decoder.decode(&[0xc0, 0x00, 0x00, 0x00]),
            Err(StunError::UnhandledFrame)
        ));
    }
}
