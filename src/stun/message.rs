use bytes::{BufMut, BytesMut};

use crate::stun::{
    attribute::{AttrKind, MessageIntegrity, Property},
    method::StunMethod,
    util, Attributes, Key, StunError, COOKIE,
};

/// STUN message encoder.
///
/// Writes the 20-byte header up front and patches the length field as
/// attributes are appended.
pub struct MessageEncoder<'a> {
    token: &'a [u8],
    bytes: &'a mut BytesMut,
}

impl<'a> MessageEncoder<'a> {
    /// create a new message with a caller supplied transaction id.
    pub fn new(method: StunMethod, token: &'a [u8; 12], bytes: &'a mut BytesMut) -> Self {
        bytes.clear();
        bytes.put_u16(method.into());
        bytes.put_u16(0);
        bytes.put(&COOKIE[..]);
        bytes.put(token.as_slice());

        Self { bytes, token }
    }

    /// rely on an old message to create a new message.
    ///
    /// The transaction id is echoed, which is what makes the reply
    /// correlate with the request on the client side.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turnd::stun::method::*;
    /// use turnd::stun::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49,
    ///     0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut attributes = Attributes::default();
    /// let mut bytes = BytesMut::new();
    /// let old = MessageRef::decode(&buffer[..], &mut attributes).unwrap();
    /// MessageEncoder::extend(BINDING_REQUEST, &old, &mut bytes);
    ///
    /// assert_eq!(&bytes[..], &buffer[..]);
    /// ```
    pub fn extend(method: StunMethod, reader: &MessageRef<'a>, bytes: &'a mut BytesMut) -> Self {
        let token = reader.token();

        bytes.clear();
        bytes.put_u16(method.into());
        bytes.put_u16(0);
        bytes.put(&COOKIE[..]);
        bytes.put(token);

        Self { bytes, token }
    }

    /// append an attribute to the message attribute list.
    pub fn append<'c, T: Property<'c>>(&'c mut self, value: T::Inner) {
        self.bytes.put_u16(T::KIND as u16);

        // record the current position, and then advance the internal
        // cursor 2 bytes, here is to reserve the position.
        let os = self.bytes.len();
        self.bytes.put_u16(0);
        T::serialize(value, self.bytes, self.token);

        // compute write index, back to source index write size.
        let size = self.bytes.len() - os - 2;
        let size_buf = (size as u16).to_be_bytes();
        self.bytes[os] = size_buf[0];
        self.bytes[os + 1] = size_buf[1];

        // if you need to padding, padding in the zero bytes.
        let pad = util::pad_size(size);
        if pad > 0 {
            self.bytes.put_bytes(0, pad);
        }
    }

    /// finish the message.
    ///
    /// Writes the attribute list size into the header; when a key is
    /// given, MESSAGE-INTEGRITY and FINGERPRINT are appended as the last
    /// two attributes the way RFC 5389 §15.4/§15.5 require.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turnd::stun::attribute::*;
    /// use turnd::stun::method::*;
    /// use turnd::stun::util::long_term_credential_digest;
    /// use turnd::stun::*;
    ///
    /// let key = long_term_credential_digest("panda", "panda", "raspberry");
    /// let token = [0u8; 12];
    ///
    /// let mut bytes = BytesMut::with_capacity(1280);
    /// let mut message = MessageEncoder::new(BINDING_REQUEST, &token, &mut bytes);
    /// message.append::<UserName>("panda");
    /// message.flush(Some(&key)).unwrap();
    ///
    /// let mut attributes = Attributes::default();
    /// let decoded = MessageRef::decode(&bytes[..], &mut attributes).unwrap();
    /// assert!(decoded.integrity(&key).is_ok());
    /// assert!(decoded.get::<Fingerprint>().is_some());
    /// ```
    pub fn flush(&mut self, key: Option<&Key>) -> Result<(), StunError> {
        // write attribute list size.
        self.set_len(self.bytes.len() - 20);

        // if need message integrity?
        if let Some(key) = key {
            self.checksum(key)?;
        }

        Ok(())
    }

    /// append a FINGERPRINT attribute to a finished message.
    ///
    /// For unsigned replies that still want the CRC cover, such as
    /// Binding responses.
    pub fn fingerprint(&mut self) {
        // the CRC covers the length field including the fingerprint
        // attribute itself.
        self.set_len(self.bytes.len() - 20 + 8);

        let fingerprint = util::fingerprint(&self.bytes[..]);
        self.bytes.put_u16(AttrKind::Fingerprint as u16);
        self.bytes.put_u16(4);
        self.bytes.put_u32(fingerprint);
    }

    // append MESSAGE-INTEGRITY and FINGERPRINT.
    //
    // The hash runs over the message with the length field adjusted to
    // include the MESSAGE-INTEGRITY attribute but nothing after it.
    fn checksum(&mut self, key: &Key) -> Result<(), StunError> {
        if self.bytes.len() < 20 {
            return Err(StunError::InvalidInput);
        }

        let len = self.bytes.len();
        self.set_len(len + 4);

        {
            let hmac = util::hmac_sha1(key, &[&self.bytes[..]])?;
            self.bytes.put_u16(AttrKind::MessageIntegrity as u16);
            self.bytes.put_u16(20);
            self.bytes.put(hmac.as_slice());
        }

        self.set_len(len + 4 + 8);

        let fingerprint = util::fingerprint(&self.bytes[..]);
        self.bytes.put_u16(AttrKind::Fingerprint as u16);
        self.bytes.put_u16(4);
        self.bytes.put_u32(fingerprint);

        Ok(())
    }

    // set stun message header size.
    fn set_len(&mut self, len: usize) {
        self.bytes[2..4].copy_from_slice((len as u16).to_be_bytes().as_slice());
    }
}

/// A decoded view over a STUN message buffer.
#[derive(Debug)]
pub struct MessageRef<'a> {
    /// message method.
    method: StunMethod,
    /// message source bytes.
    bytes: &'a [u8],
    /// offset of the MESSAGE-INTEGRITY attribute, when present.
    valid_offset: u16,
    // message attribute list.
    attributes: &'a Attributes,
}

impl<'a> MessageRef<'a> {
    /// message method.
    #[inline]
    pub fn method(&self) -> StunMethod {
        self.method
    }

    /// message transaction id.
    #[inline]
    pub fn token(&self) -> &'a [u8] {
        &self.bytes[8..20]
    }

    /// get an attribute from the message attribute list.
    pub fn get<T: Property<'a>>(&self) -> Option<T::Inner> {
        let range = self.attributes.get(T::KIND)?;
        T::deserialize(&self.bytes[range], self.token()).ok()
    }

    /// get all the values of an attribute from the message.
    ///
    /// A message can carry several attributes of the same type, the
    /// CreatePermission request being the prime example.
    pub fn get_all<T: Property<'a>>(&'a self) -> impl Iterator<Item = T::Inner> + 'a {
        self.attributes
            .get_all(T::KIND)
            .filter_map(|range| T::deserialize(&self.bytes[range.clone()], self.token()).ok())
    }

    /// check the MESSAGE-INTEGRITY attribute.
    ///
    /// The hash runs over the message up to the attribute preceding
    /// MESSAGE-INTEGRITY, with the header length field adjusted to end
    /// at the attribute itself; attributes such as FINGERPRINT that
    /// follow it are excluded.
    ///
    /// # Test
    ///
    /// ```
    /// use turnd::stun::util::long_term_credential_digest;
    /// use turnd::stun::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x03, 0x00, 0x50, 0x21, 0x12, 0xa4, 0x42, 0x64, 0x4f, 0x5a,
    ///     0x78, 0x6a, 0x56, 0x33, 0x62, 0x4b, 0x52, 0x33, 0x31, 0x00, 0x19, 0x00,
    ///     0x04, 0x11, 0x00, 0x00, 0x00, 0x00, 0x06, 0x00, 0x05, 0x70, 0x61, 0x6e,
    ///     0x64, 0x61, 0x00, 0x00, 0x00, 0x00, 0x14, 0x00, 0x09, 0x72, 0x61, 0x73,
    ///     0x70, 0x62, 0x65, 0x72, 0x72, 0x79, 0x00, 0x00, 0x00, 0x00, 0x15, 0x00,
    ///     0x10, 0x31, 0x63, 0x31, 0x33, 0x64, 0x32, 0x62, 0x32, 0x34, 0x35, 0x62,
    ///     0x33, 0x61, 0x37, 0x33, 0x34, 0x00, 0x08, 0x00, 0x14, 0xd6, 0x78, 0x26,
    ///     0x99, 0x0e, 0x15, 0x56, 0x15, 0xe5, 0xf4, 0x24, 0x74, 0xe2, 0x3c, 0x26,
    ///     0xc5, 0xb1, 0x03, 0xb2, 0x6d,
    /// ];
    ///
    /// let key = long_term_credential_digest("panda", "panda", "raspberry");
    ///
    /// let mut attributes = Attributes::default();
    /// let message = MessageRef::decode(&buffer[..], &mut attributes).unwrap();
    /// assert!(message.integrity(&key).is_ok());
    /// ```
    pub fn integrity(&self, key: &Key) -> Result<(), StunError> {
        if self.bytes.is_empty() || self.valid_offset < 20 {
            return Err(StunError::InvalidInput);
        }

        // unwrap MessageIntegrity attribute, an error occurs if not
        // found.
        let integrity = self
            .get::<MessageIntegrity>()
            .ok_or(StunError::NotFoundIntegrity)?;

        // the length field is adjusted to point to the end of the
        // MESSAGE-INTEGRITY attribute.
        let size_buf = (self.valid_offset + 4).to_be_bytes();
        let body = [
            &self.bytes[0..2],
            size_buf.as_slice(),
            &self.bytes[4..self.valid_offset as usize],
        ];

        let hmac = util::hmac_sha1(key, &body)?;
        if integrity != hmac.as_slice() {
            return Err(StunError::IntegrityFailed);
        }

        Ok(())
    }

    pub fn decode(bytes: &'a [u8], attributes: &'a mut Attributes) -> Result<Self, StunError> {
        let count_size = bytes.len();
        if count_size < 20 {
            return Err(StunError::InvalidInput);
        }

        let method = StunMethod::try_from(u16::from_be_bytes(bytes[..2].try_into()?))?;

        // the length field does not include the 20-byte header.
        let size = u16::from_be_bytes(bytes[2..4].try_into()?) as usize + 20;
        if count_size < size {
            return Err(StunError::InvalidInput);
        }

        if bytes[4..8] != COOKIE[..] {
            return Err(StunError::NotFoundCookie);
        }

        let mut find_integrity = false;
        let mut valid_offset = 0;
        let mut offset = 20;

        loop {
            // if the buf length is not long enough to continue, jump out
            // of the loop.
            if count_size - offset < 4 {
                break;
            }

            // get attribute type
            let key = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);

            // whether the MessageIntegrity attribute has been found, if
            // found, record the current offset position.
            if !find_integrity {
                valid_offset = offset as u16;
            }

            // check whether the current attribute is MessageIntegrity,
            // if it is, mark this attribute has been found.
            if key == AttrKind::MessageIntegrity as u16 {
                find_integrity = true;
            }

            // get attribute size
            let size = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;

            // check if the attribute length has overflowed.
            offset += 4;
            if count_size - offset < size {
                break;
            }

            // body range.
            let range = offset..(offset + size);

            // if there are padding bytes, skip padding size.
            if size > 0 {
                offset += size + util::pad_size(size);
            }

            // skip the attributes that are not supported.
            let kind = match AttrKind::try_from(key) {
                Err(_) => continue,
                Ok(kind) => kind,
            };

            // get attribute body, insert attribute to attributes list.
            attributes.append(kind, range);
        }

        Ok(Self {
            method,
            bytes,
            valid_offset,
            attributes,
        })
    }

    /// The total size of the message in a byte stream.
    ///
    /// # Test
    ///
    /// ```
    /// use turnd::stun::MessageRef;
    ///
    /// let buffer: [u8; 20] = [
    ///     0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// assert_eq!(MessageRef::message_size(&buffer[..]).unwrap(), 20);
    /// ```
    pub fn message_size(bytes: &[u8]) -> Result<usize, StunError> {
        if bytes.len() < 4 || bytes[0] >> 6 != 0 {
            return Err(StunError::InvalidInput);
        }

        Ok(u16::from_be_bytes(bytes[2..4].try_into()?) as usize + 20)
    }
}

impl AsRef<[u8]> for MessageRef<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::attribute::*;
    use crate::stun::method::*;

    #[test]
    fn signed_message_roundtrip() {
        let key = util::long_term_credential_digest("user", "pion.ly", "pass");
        let token: [u8; 12] = rand::random();
        let mut bytes = BytesMut::with_capacity(1280);

        {
            let mut message = MessageEncoder::new(ALLOCATE_REQUEST, &token, &mut bytes);
            message.append::<UserName>("user");
            message.append::<Realm>("pion.ly");
            message.append::<Nonce>("7a70ab0866d2c70f15313b48155a4a23");
            message.append::<RequestedTransport>(TRANSPORT_UDP);
            message.flush(Some(&key)).unwrap();
        }

        let mut attributes = Attributes::default();
        let message = MessageRef::decode(&bytes, &mut attributes).unwrap();

        assert_eq!(message.method(), ALLOCATE_REQUEST);
        assert_eq!(message.get::<UserName>(), Some("user"));
        assert_eq!(message.get::<Realm>(), Some("pion.ly"));
        assert_eq!(message.get::<RequestedTransport>(), Some(TRANSPORT_UDP));
        assert!(message.integrity(&key).is_ok());

        // a different key must not verify.
        let bad = util::long_term_credential_digest("user", "pion.ly", "wrong");
        assert!(matches!(
            message.integrity(&bad),
            Err(StunError::IntegrityFailed)
        ));
    }

    #[test]
    fn fingerprint_only_seal() {
        let token: [u8; 12] = rand::random();
        let mut bytes = BytesMut::with_capacity(1280);

        {
            let mut message = MessageEncoder::new(BINDING_RESPONSE, &token, &mut bytes);
            message.append::<XorMappedAddress>("127.0.0.1:3478".parse().unwrap());
            message.flush(None).unwrap();
            message.fingerprint();
        }

        let mut attributes = Attributes::default();
        let message = MessageRef::decode(&bytes, &mut attributes).unwrap();
        let fingerprint = message.get::<Fingerprint>().unwrap();

        // the CRC covers everything before the fingerprint attribute.
        assert_eq!(fingerprint, util::fingerprint(&bytes[..bytes.len() - 8]));
    }

    #[test]
    fn multiple_peer_addresses() {
        let token: [u8; 12] = rand::random();
        let mut bytes = BytesMut::with_capacity(1280);

        {
            let mut message = MessageEncoder::new(CREATE_PERMISSION_REQUEST, &token, &mut bytes);
            message.append::<XorPeerAddress>("1.2.3.4:8080".parse().unwrap());
            message.append::<XorPeerAddress>("5.6.7.8:9090".parse().unwrap());
            message.flush(None).unwrap();
        }

        let mut attributes = Attributes::default();
        let message = MessageRef::decode(&bytes, &mut attributes).unwrap();
        let peers: Vec<_> = message.get_all::<XorPeerAddress>().collect();

        assert_eq!(
            peers,
            vec![
                "1.2.3.4:8080".parse().unwrap(),
                "5.6.7.8:9090".parse().unwrap()
            ]
        );
    }
}
