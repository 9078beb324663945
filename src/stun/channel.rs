use bytes::{BufMut, BytesMut};

use crate::stun::{util, StunError};

/// The ChannelData Message
///
/// The ChannelData message is used to carry application data between the
/// client and the server.  It has the following format:
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Channel Number        |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                       Application Data                        /
/// /                                                               /
/// |                                                               |
/// |                               +-------------------------------+
/// |                               |
/// +-------------------------------+
/// ```
///
/// The Length field specifies the length in bytes of the application
/// data field, it does not include the size of the ChannelData header
/// nor the padding that aligns the frame to 4 bytes.  Note that 0 is a
/// valid length.
#[derive(Debug)]
pub struct ChannelData<'a> {
    /// channel number, always in 0x4000..=0x7FFF.
    pub number: u16,
    /// the application data, without header or padding.
    pub bytes: &'a [u8],
}

impl ChannelData<'_> {
    /// The total frame size in a byte stream.  Over TCP the frame is
    /// padded to a multiple of 4, over UDP it ends with the data.
    ///
    /// # Test
    ///
    /// ```
    /// use turnd::stun::ChannelData;
    ///
    /// let buffer: [u8; 4] = [0x40, 0x00, 0x00, 0x40];
    ///
    /// assert_eq!(ChannelData::message_size(&buffer, false).unwrap(), 68);
    /// ```
    pub fn message_size(bytes: &[u8], is_tcp: bool) -> Result<usize, StunError> {
        if bytes.len() < 4 {
            return Err(StunError::InvalidInput);
        }

        if bytes[0] >> 6 != 1 {
            return Err(StunError::InvalidInput);
        }

        let size = u16::from_be_bytes(bytes[2..4].try_into()?) as usize;
        Ok(4 + size + if is_tcp { util::pad_size(size) } else { 0 })
    }

    /// Write the frame for this channel data, padded to 4 bytes.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turnd::stun::ChannelData;
    ///
    /// let mut bytes = BytesMut::new();
    /// ChannelData { number: 0x4000, bytes: b"Hello" }.encode(&mut bytes);
    ///
    /// assert_eq!(
    ///     &bytes[..],
    ///     &[0x40, 0x00, 0x00, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x00, 0x00, 0x00],
    /// );
    /// ```
    pub fn encode(&self, bytes: &mut BytesMut) {
        bytes.clear();
        bytes.put_u16(self.number);
        bytes.put_u16(self.bytes.len() as u16);
        bytes.put(self.bytes);

        let pad = util::pad_size(self.bytes.len());
        if pad > 0 {
            bytes.put_bytes(0, pad);
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for ChannelData<'a> {
    type Error = StunError;

    /// # Test
    ///
    /// ```
    /// use std::convert::TryFrom;
    /// use turnd::stun::ChannelData;
    ///
    /// let buffer: [u8; 4] = [0x40, 0x00, 0x00, 0x00];
    ///
    /// let data = ChannelData::try_from(&buffer[..]).unwrap();
    /// assert_eq!(data.number, 16384);
    /// assert!(data.bytes.is_empty());
    /// ```
    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 4 {
            return Err(StunError::IncompleteFrame);
        }

        let number = u16::from_be_bytes(bytes[..2].try_into()?);
        if !(0x4000..=0x7FFF).contains(&number) {
            return Err(StunError::BadChannelNumber);
        }

        // A frame shorter than its declared length is rejected without
        // consuming anything, the transport may still be buffering it.
        let size = u16::from_be_bytes(bytes[2..4].try_into()?) as usize;
        if bytes.len() - 4 < size {
            return Err(StunError::IncompleteFrame);
        }

        Ok(Self {
            number,
            bytes: &bytes[4..4 + size],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A truncated frame reports "incomplete TURN frame" and consumes no
    // bytes.
    #[test]
    fn rejects_truncated_frame() {
        let buffer = [0x40u8, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = ChannelData::try_from(&buffer[..]);

        assert!(matches!(result, Err(StunError::IncompleteFrame)));
        assert_eq!(
            ChannelData::try_from(&buffer[..]).unwrap_err().to_string(),
            "incomplete TURN frame"
        );
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let buffer = [0x3fu8, 0xff, 0x00, 0x00];
        assert!(matches!(
            ChannelData::try_from(&buffer[..]),
            Err(StunError::BadChannelNumber)
        ));

        let buffer = [0x80u8, 0x00, 0x00, 0x00];
        assert!(matches!(
            ChannelData::try_from(&buffer[..]),
            Err(StunError::BadChannelNumber)
        ));
    }

    #[test]
    fn frame_roundtrip() {
        let mut bytes = BytesMut::new();
        ChannelData {
            number: 0x4123,
            bytes: b"turn relay payload",
        }
        .encode(&mut bytes);

        let data = ChannelData::try_from(&bytes[..]).unwrap();
        assert_eq!(data.number, 0x4123);
        assert_eq!(data.bytes, b"turn relay payload");
    }
}
