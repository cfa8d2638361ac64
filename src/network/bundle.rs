//! Packet framing
//!
//! A packet is one UDP datagram holding back-to-back messages:
//! `[id:1][length prefix per element][body]`. There is no packet header, so a
//! registry can build a valid packet from an element prefix and an address.

use bytes::{Buf, Bytes, BytesMut};

use super::interface::{InterfaceElement, InterfaceMinder, MessageId};
use super::stream::{ensure_remaining, get_u8, WireError};

/// Largest datagram a bundle will grow to.
pub const MAX_PACKET_SIZE: usize = 1472;

/// Outbound messages waiting to be sent as one packet.
#[derive(Debug, Default, Clone)]
pub struct Bundle {
    data: BytesMut,
    message_count: usize,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message.
    ///
    /// Fails without touching the bundle if the body does not suit the
    /// element's length style or the packet would outgrow [`MAX_PACKET_SIZE`].
    pub fn add_message(&mut self, element: &InterfaceElement, body: &[u8]) -> Result<(), WireError> {
        let size = self.data.len() + element.header_size() + body.len();
        if size > MAX_PACKET_SIZE {
            return Err(WireError::PacketOverflow {
                size,
                max: MAX_PACKET_SIZE,
            });
        }
        element.write_header(&mut self.data, body.len())?;
        self.data.extend_from_slice(body);
        self.message_count += 1;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn message_count(&self) -> usize {
        self.message_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the packet bytes, leaving the bundle empty.
    pub fn take(&mut self) -> Bytes {
        self.message_count = 0;
        self.data.split().freeze()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.message_count = 0;
    }
}

/// Splits an inbound packet into messages using an interface's elements.
///
/// Yields `Err` once and then stops: after a framing error the rest of the
/// packet cannot be trusted.
pub struct MessageReader<'a> {
    minder: &'a InterfaceMinder,
    data: Bytes,
    failed: bool,
}

impl<'a> MessageReader<'a> {
    pub fn new(minder: &'a InterfaceMinder, data: Bytes) -> Self {
        Self {
            minder,
            data,
            failed: false,
        }
    }

    fn read_one(&mut self) -> Result<(MessageId, Bytes), WireError> {
        let id = get_u8(&mut self.data)?;
        let element = self.minder.element(id).ok_or(WireError::UnknownMessage(id))?;
        let len = element.read_length(&mut self.data)?;
        ensure_remaining(&self.data, len)?;
        Ok((id, self.data.copy_to_bytes(len)))
    }
}

impl Iterator for MessageReader<'_> {
    type Item = Result<(MessageId, Bytes), WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.data.has_remaining() {
            return None;
        }
        let item = self.read_one();
        self.failed = item.is_err();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::interface::{LengthStyle, LengthWidth};

    fn minder() -> InterfaceMinder {
        let mut minder = InterfaceMinder::new("BaseApp");
        minder.add("birth", LengthStyle::Fixed(8));
        minder.add("say", LengthStyle::Variable(LengthWidth::One));
        minder.add("bulk", LengthStyle::Variable(LengthWidth::Four));
        minder
    }

    #[test]
    fn test_bundle_then_read_back() {
        let minder = minder();
        let mut bundle = Bundle::new();
        bundle.add_message(minder.element(1).unwrap(), b"hello").unwrap();
        bundle.add_message(minder.element(0).unwrap(), &[7; 8]).unwrap();
        bundle.add_message(minder.element(2).unwrap(), b"").unwrap();
        assert_eq!(bundle.message_count(), 3);
        assert_eq!(bundle.len(), (2 + 5) + (1 + 8) + (1 + 4));

        let packet = bundle.take();
        assert!(bundle.is_empty());
        assert_eq!(bundle.len(), 0);

        let messages: Vec<_> = MessageReader::new(&minder, packet)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], (1, Bytes::from_static(b"hello")));
        assert_eq!(messages[1], (0, Bytes::from_static(&[7; 8])));
        assert_eq!(messages[2], (2, Bytes::new()));
    }

    #[test]
    fn test_unknown_id_stops_reading() {
        let minder = minder();
        let packet = Bytes::from_static(&[1, 2, b'h', b'i', 42, 0, 0]);
        let mut reader = MessageReader::new(&minder, packet);
        assert_eq!(reader.next().unwrap().unwrap().1, Bytes::from_static(b"hi"));
        assert_eq!(reader.next().unwrap(), Err(WireError::UnknownMessage(42)));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_body() {
        let minder = minder();
        let packet = Bytes::from_static(&[0, 1, 2, 3]);
        let mut reader = MessageReader::new(&minder, packet);
        assert_eq!(
            reader.next().unwrap(),
            Err(WireError::Truncated { needed: 8, remaining: 3 })
        );
    }

    #[test]
    fn test_overflow_leaves_bundle_untouched() {
        let minder = minder();
        let mut bundle = Bundle::new();
        bundle.add_message(minder.element(1).unwrap(), b"ok").unwrap();
        let before = bundle.len();
        let big = vec![0u8; MAX_PACKET_SIZE];
        assert!(matches!(
            bundle.add_message(minder.element(2).unwrap(), &big),
            Err(WireError::PacketOverflow { .. })
        ));
        assert_eq!(bundle.len(), before);
        assert_eq!(bundle.message_count(), 1);
    }
}
