use std::net::{IpAddr, SocketAddr};

use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

use crate::stun::{StunError, COOKIE};

/// The transport protocol codepoint carried by REQUESTED-TRANSPORT.
///
/// The codepoints used in this field are taken from those allowed in the
/// Protocol field in the IPv4 header; RFC 5766 only allows the use of
/// codepoint 17 (User Datagram Protocol).
pub const TRANSPORT_UDP: u8 = 17;

/// attribute type registry.
#[repr(u16)]
#[derive(TryFromPrimitive, PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum AttrKind {
    MappedAddress = 0x0001,
    UserName = 0x0006,
    MessageIntegrity = 0x0008,
    ErrorCode = 0x0009,
    ChannelNumber = 0x000C,
    Lifetime = 0x000D,
    XorPeerAddress = 0x0012,
    Data = 0x0013,
    Realm = 0x0014,
    Nonce = 0x0015,
    XorRelayedAddress = 0x0016,
    EvenPort = 0x0018,
    RequestedTransport = 0x0019,
    DontFragment = 0x001A,
    XorMappedAddress = 0x0020,
    ReservationToken = 0x0022,
    Software = 0x8022,
    Fingerprint = 0x8028,
    ResponseOrigin = 0x802B,
}

/// typed stun/turn message attribute.
pub trait Property<'a> {
    /// the rust-side value of the attribute.
    type Inner;

    /// the registry type of the attribute.
    const KIND: AttrKind;

    /// write the attribute value into the buffer.
    fn serialize(value: Self::Inner, bytes: &mut BytesMut, token: &'a [u8]);

    /// read the attribute value out of the value slice.
    fn deserialize(bytes: &'a [u8], token: &'a [u8]) -> Result<Self::Inner, StunError>;
}

/// The USERNAME attribute is used for message integrity.  It identifies
/// the username and password combination used in the message-integrity
/// check.
pub struct UserName;

impl<'a> Property<'a> for UserName {
    type Inner = &'a str;

    const KIND: AttrKind = AttrKind::UserName;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// The REALM attribute may be present in requests and responses.
///
/// Presence of the REALM attribute in a request indicates that long-term
/// credentials are being used for authentication.  Presence in certain
/// error responses indicates that the server wishes the client to use a
/// long-term credential in that realm for authentication.
pub struct Realm;

impl<'a> Property<'a> for Realm {
    type Inner = &'a str;

    const KIND: AttrKind = AttrKind::Realm;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// The NONCE attribute may be present in requests and responses.  It
/// contains a sequence of qdtext or quoted-pair, without the surrounding
/// quote characters, and MUST be fewer than 128 characters.
pub struct Nonce;

impl<'a> Property<'a> for Nonce {
    type Inner = &'a str;

    const KIND: AttrKind = AttrKind::Nonce;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// The SOFTWARE attribute contains a textual description of the software
/// being used by the agent sending the message.  The attribute has no
/// impact on operation of the protocol and serves only as a tool for
/// diagnostic and debugging purposes.
pub struct Software;

impl<'a> Property<'a> for Software {
    type Inner = &'a str;

    const KIND: AttrKind = AttrKind::Software;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// The DATA attribute is present in all Send and Data indications.  The
/// value portion of this attribute is variable length and consists of
/// the application data.
pub struct Data;

impl<'a> Property<'a> for Data {
    type Inner = &'a [u8];

    const KIND: AttrKind = AttrKind::Data;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put(value);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(bytes)
    }
}

/// The MESSAGE-INTEGRITY attribute contains an HMAC-SHA1 of the STUN
/// message.  Since it uses the SHA-1 hash, the HMAC will be 20 bytes.
pub struct MessageIntegrity;

impl<'a> Property<'a> for MessageIntegrity {
    type Inner = &'a [u8];

    const KIND: AttrKind = AttrKind::MessageIntegrity;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put(value);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(bytes)
    }
}

/// The LIFETIME attribute represents the duration for which the server
/// will maintain an allocation in the absence of a refresh.  The value
/// is a 32-bit unsigned integral number of seconds remaining until
/// expiration.
pub struct Lifetime;

impl<'a> Property<'a> for Lifetime {
    type Inner = u32;

    const KIND: AttrKind = AttrKind::Lifetime;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u32(value);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(u32::from_be_bytes(bytes.get(..4).ok_or(StunError::InvalidInput)?.try_into()?))
    }
}

/// The CHANNEL-NUMBER attribute contains the number of the channel.  The
/// value portion of this attribute is 4 bytes long and consists of a
/// 16-bit unsigned integer followed by a two-octet RFFU (Reserved For
/// Future Use) field, which MUST be set to 0 on transmission and MUST be
/// ignored on reception.
pub struct ChannelNumber;

impl<'a> Property<'a> for ChannelNumber {
    type Inner = u16;

    const KIND: AttrKind = AttrKind::ChannelNumber;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u16(value);
        bytes.put_u16(0);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(u16::from_be_bytes(bytes.get(..2).ok_or(StunError::InvalidInput)?.try_into()?))
    }
}

/// This attribute is used by the client to request a specific transport
/// protocol for the allocated transport address:
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    Protocol   |                    RFFU                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub struct RequestedTransport;

impl<'a> Property<'a> for RequestedTransport {
    type Inner = u8;

    const KIND: AttrKind = AttrKind::RequestedTransport;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u8(value);
        bytes.put_bytes(0, 3);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        bytes.first().copied().ok_or(StunError::InvalidInput)
    }
}

/// This attribute allows the client to request that the port in the
/// relayed transport address be even, and (optionally) that the server
/// reserve the next-higher port number.  The value is one byte carrying
/// the R bit in the most significant position.
pub struct EvenPort;

impl<'a> Property<'a> for EvenPort {
    /// whether the R (reserve) bit is set.
    type Inner = bool;

    const KIND: AttrKind = AttrKind::EvenPort;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u8(if value { 0x80 } else { 0x00 });
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(bytes.first().map(|b| b & 0x80 != 0).unwrap_or_default())
    }
}

/// The RESERVATION-TOKEN attribute contains a token that uniquely
/// identifies a relayed transport address being held in reserve by the
/// server.  The value is 8 bytes.
pub struct ReservationToken;

impl<'a> Property<'a> for ReservationToken {
    type Inner = u64;

    const KIND: AttrKind = AttrKind::ReservationToken;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u64(value);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(u64::from_be_bytes(bytes.get(..8).ok_or(StunError::InvalidInput)?.try_into()?))
    }
}

/// This attribute is used by the client to request that the server set
/// the DF (Don't Fragment) bit in the IP header when relaying the
/// application data onward to the peer.  It has no value part.
pub struct DontFragment;

impl<'a> Property<'a> for DontFragment {
    type Inner = bool;

    const KIND: AttrKind = AttrKind::DontFragment;

    fn serialize(_: Self::Inner, _: &mut BytesMut, _: &[u8]) {}

    fn deserialize(_: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(true)
    }
}

/// The XOR-PEER-ADDRESS specifies the address and port of the peer as
/// seen from the TURN server.  It is encoded in the same way as
/// XOR-MAPPED-ADDRESS.
pub struct XorPeerAddress;

impl<'a> Property<'a> for XorPeerAddress {
    type Inner = SocketAddr;

    const KIND: AttrKind = AttrKind::XorPeerAddress;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, bytes, true)
    }

    fn deserialize(bytes: &'a [u8], token: &[u8]) -> Result<Self::Inner, StunError> {
        Addr::try_from(bytes, token, true)
    }
}

/// The XOR-RELAYED-ADDRESS is present in Allocate responses.  It
/// specifies the address and port that the server allocated to the
/// client.  It is encoded in the same way as XOR-MAPPED-ADDRESS.
pub struct XorRelayedAddress;

impl<'a> Property<'a> for XorRelayedAddress {
    type Inner = SocketAddr;

    const KIND: AttrKind = AttrKind::XorRelayedAddress;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, bytes, true)
    }

    fn deserialize(bytes: &'a [u8], token: &[u8]) -> Result<Self::Inner, StunError> {
        Addr::try_from(bytes, token, true)
    }
}

/// The XOR-MAPPED-ADDRESS attribute is identical to the MAPPED-ADDRESS
/// attribute, except that the reflexive transport address is obfuscated
/// through the XOR function, to survive NATs that rewrite binary
/// payloads containing their own public address.
pub struct XorMappedAddress;

impl<'a> Property<'a> for XorMappedAddress {
    type Inner = SocketAddr;

    const KIND: AttrKind = AttrKind::XorMappedAddress;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, bytes, true)
    }

    fn deserialize(bytes: &'a [u8], token: &[u8]) -> Result<Self::Inner, StunError> {
        Addr::try_from(bytes, token, true)
    }
}

/// The MAPPED-ADDRESS attribute indicates a reflexive transport address
/// of the client.  This attribute is used only by servers for achieving
/// backwards compatibility with RFC3489 clients.
pub struct MappedAddress;

impl<'a> Property<'a> for MappedAddress {
    type Inner = SocketAddr;

    const KIND: AttrKind = AttrKind::MappedAddress;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, bytes, false)
    }

    fn deserialize(bytes: &'a [u8], token: &[u8]) -> Result<Self::Inner, StunError> {
        Addr::try_from(bytes, token, false)
    }
}

/// The RESPONSE-ORIGIN attribute is inserted by the server and indicates
/// the source IP address and port the response was sent from.  It is
/// useful for detecting double NAT configurations.
pub struct ResponseOrigin;

impl<'a> Property<'a> for ResponseOrigin {
    type Inner = SocketAddr;

    const KIND: AttrKind = AttrKind::ResponseOrigin;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, bytes, false)
    }

    fn deserialize(bytes: &'a [u8], token: &[u8]) -> Result<Self::Inner, StunError> {
        Addr::try_from(bytes, token, false)
    }
}

/// The FINGERPRINT attribute MAY be present in all STUN messages.
///
/// The value of the attribute is computed as the CRC-32 of the STUN
/// message up to (but excluding) the FINGERPRINT attribute itself,
/// XOR'ed with the 32-bit value 0x5354554e.  When present, the
/// FINGERPRINT attribute MUST be the last attribute in the message.
pub struct Fingerprint;

impl<'a> Property<'a> for Fingerprint {
    type Inner = u32;

    const KIND: AttrKind = AttrKind::Fingerprint;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u32(value);
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        Ok(u32::from_be_bytes(bytes.get(..4).ok_or(StunError::InvalidInput)?.try_into()?))
    }
}

/// The ERROR-CODE attribute is used in error response messages.  It
/// contains a numeric error code value in the range of 300 to 699 plus a
/// textual reason phrase encoded in UTF-8.
///
/// To facilitate processing, the class of the error code (the hundreds
/// digit) is encoded separately from the rest of the code:
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Reserved, should be 0         |Class|     Number    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Reason Phrase (variable)                                ..
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[repr(u16)]
#[derive(TryFromPrimitive, PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorKind {
    BadRequest = 0x0400,
    Unauthorized = 0x0401,
    Forbidden = 0x0403,
    UnknownAttribute = 0x0414,
    AllocationMismatch = 0x0425,
    StaleNonce = 0x0426,
    WrongCredentials = 0x0429,
    UnsupportedTransport = 0x042A,
    ServerError = 0x0500,
    InsufficientCapacity = 0x0508,
}

impl From<ErrorKind> for &'static str {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::UnknownAttribute => "Unknown Attribute",
            ErrorKind::AllocationMismatch => "Allocation Mismatch",
            ErrorKind::StaleNonce => "Stale Nonce",
            ErrorKind::WrongCredentials => "Wrong Credentials",
            ErrorKind::UnsupportedTransport => "Unsupported Transport Protocol",
            ErrorKind::ServerError => "Server Error",
            ErrorKind::InsufficientCapacity => "Insufficient Capacity",
        }
    }
}

/// The decoded value of an ERROR-CODE attribute.  The code is carried as
/// `class << 8 | number`, the way it travels on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error<'a> {
    pub code: u16,
    pub message: &'a str,
}

impl Error<'_> {
    /// create error from error kind.
    ///
    /// # Test
    ///
    /// ```
    /// use turnd::stun::attribute::*;
    ///
    /// let error = Error::from(ErrorKind::Unauthorized);
    /// assert_eq!(error.code, ErrorKind::Unauthorized as u16);
    /// assert_eq!(error.message, "Unauthorized");
    /// ```
    pub fn from(kind: ErrorKind) -> Self {
        Self {
            code: kind as u16,
            message: kind.into(),
        }
    }
}

/// The ERROR-CODE attribute itself.
pub struct ErrorCode;

impl<'a> Property<'a> for ErrorCode {
    type Inner = Error<'a>;

    const KIND: AttrKind = AttrKind::ErrorCode;

    fn serialize(value: Self::Inner, bytes: &mut BytesMut, _: &[u8]) {
        bytes.put_u16(0);
        bytes.put_u16(value.code);
        bytes.put(value.message.as_bytes());
    }

    fn deserialize(bytes: &'a [u8], _: &[u8]) -> Result<Self::Inner, StunError> {
        if bytes.len() < 4 {
            return Err(StunError::InvalidInput);
        }

        Ok(Error {
            code: u16::from_be_bytes(bytes[2..4].try_into()?),
            message: std::str::from_utf8(&bytes[4..])?,
        })
    }
}

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// address codec shared by the (XOR-)MAPPED/PEER/RELAYED address
/// attributes.
///
/// X-Port is computed by XOR'ing the mapped port with the most
/// significant 16 bits of the magic cookie.  If the IP address family is
/// IPv4, X-Address is computed by XOR'ing the mapped IP address with the
/// magic cookie.  If the IP address family is IPv6, X-Address is
/// computed by XOR'ing the mapped IP address with the concatenation of
/// the magic cookie and the 96-bit transaction ID.
pub struct Addr;

impl Addr {
    /// encode a SocketAddr into the buffer.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turnd::stun::attribute::*;
    ///
    /// let xor_addr_buf: [u8; 8] = [0x00, 0x01, 0xfc, 0xbe, 0xe1, 0xba, 0xa4, 0x29];
    /// let addr_buf: [u8; 8] = [0x00, 0x01, 0xdd, 0xac, 0xc0, 0xa8, 0x00, 0x6b];
    /// let token: [u8; 12] = [
    ///     0x6c, 0x46, 0x62, 0x54, 0x75, 0x4b, 0x44, 0x51, 0x46, 0x48, 0x4c, 0x71,
    /// ];
    ///
    /// let source = "192.168.0.107:56748".parse().unwrap();
    ///
    /// let mut buffer = BytesMut::with_capacity(1280);
    /// Addr::into(&source, &token, &mut buffer, true);
    /// assert_eq!(&xor_addr_buf, &buffer[..]);
    ///
    /// let mut buffer = BytesMut::with_capacity(1280);
    /// Addr::into(&source, &token, &mut buffer, false);
    /// assert_eq!(&addr_buf, &buffer[..]);
    /// ```
    pub fn into(addr: &SocketAddr, token: &[u8], bytes: &mut BytesMut, is_xor: bool) {
        bytes.put_u8(0);
        let addr = if is_xor { xor(addr, token) } else { *addr };

        match addr.ip() {
            IpAddr::V4(ip) => {
                bytes.put_u8(FAMILY_IPV4);
                bytes.put_u16(addr.port());
                bytes.put(&ip.octets()[..]);
            }
            IpAddr::V6(ip) => {
                bytes.put_u8(FAMILY_IPV6);
                bytes.put_u16(addr.port());
                bytes.put(&ip.octets()[..]);
            }
        }
    }

    /// decode a SocketAddr from the value slice.
    ///
    /// # Test
    ///
    /// ```
    /// use turnd::stun::attribute::*;
    ///
    /// let xor_addr_buf: [u8; 8] = [0x00, 0x01, 0xfc, 0xbe, 0xe1, 0xba, 0xa4, 0x29];
    /// let addr_buf: [u8; 8] = [0x00, 0x01, 0xdd, 0xac, 0xc0, 0xa8, 0x00, 0x6b];
    /// let token: [u8; 12] = [
    ///     0x6c, 0x46, 0x62, 0x54, 0x75, 0x4b, 0x44, 0x51, 0x46, 0x48, 0x4c, 0x71,
    /// ];
    ///
    /// let source: std::net::SocketAddr = "192.168.0.107:56748".parse().unwrap();
    ///
    /// assert_eq!(Addr::try_from(&xor_addr_buf, &token, true).unwrap(), source);
    /// assert_eq!(Addr::try_from(&addr_buf, &token, false).unwrap(), source);
    /// ```
    pub fn try_from(bytes: &[u8], token: &[u8], is_xor: bool) -> Result<SocketAddr, StunError> {
        if bytes.len() < 4 {
            return Err(StunError::InvalidInput);
        }

        let port = u16::from_be_bytes(bytes[2..4].try_into()?);
        let ip = match bytes[1] {
            FAMILY_IPV4 => {
                let octets: [u8; 4] =
                    bytes.get(4..8).ok_or(StunError::InvalidInput)?.try_into()?;
                IpAddr::from(octets)
            }
            FAMILY_IPV6 => {
                let octets: [u8; 16] =
                    bytes.get(4..20).ok_or(StunError::InvalidInput)?.try_into()?;
                IpAddr::from(octets)
            }
            _ => return Err(StunError::InvalidInput),
        };

        let addr = SocketAddr::new(ip, port);
        Ok(if is_xor { xor(&addr, token) } else { addr })
    }
}

// The xor transform is an involution, encoding and decoding share it.
fn xor(addr: &SocketAddr, token: &[u8]) -> SocketAddr {
    let port = addr.port() ^ u16::from_be_bytes([COOKIE[0], COOKIE[1]]);
    let ip = match addr.ip() {
        IpAddr::V4(ip) => {
            let mut octets = ip.octets();
            for (i, b) in octets.iter_mut().enumerate() {
                *b ^= COOKIE[i];
            }

            IpAddr::from(octets)
        }
        IpAddr::V6(ip) => {
            let mut octets = ip.octets();
            for (i, b) in octets.iter_mut().take(4).enumerate() {
                *b ^= COOKIE[i];
            }

            for (i, b) in octets.iter_mut().skip(4).enumerate() {
                *b ^= token[i];
            }

            IpAddr::from(octets)
        }
    };

    SocketAddr::new(ip, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        let mut bytes = BytesMut::new();
        ErrorCode::serialize(Error::from(ErrorKind::AllocationMismatch), &mut bytes, &[]);

        let error = ErrorCode::deserialize(&bytes, &[]).unwrap();
        assert_eq!(error.code, 0x0425);
        assert_eq!(error.message, "Allocation Mismatch");
    }

    #[test]
    fn xor_is_an_involution() {
        let token: [u8; 12] = rand::random();
        let addr = "192.168.0.107:56748".parse().unwrap();
        assert_eq!(xor(&xor(&addr, &token), &token), addr);

        let addr = "[fe80::1]:3478".parse().unwrap();
        assert_eq!(xor(&xor(&addr, &token), &token), addr);
    }

    #[test]
    fn even_port_reserve_bit() {
        let mut bytes = BytesMut::new();
        EvenPort::serialize(true, &mut bytes, &[]);
        assert_eq!(&bytes[..], &[0x80]);
        assert!(EvenPort::deserialize(&bytes, &[]).unwrap());

        let mut bytes = BytesMut::new();
        EvenPort::serialize(false, &mut bytes, &[]);
        assert_eq!(&bytes[..], &[0x00]);
        assert!(!EvenPort::deserialize(&bytes, &[]).unwrap());
    }
}
