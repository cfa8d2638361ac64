//! Channels to remote processes
//!
//! A [`Channel`] is the logical conversation with one remote [`Address`]. It
//! queues outbound messages in a [`Bundle`] until the nub sends them. The
//! target can be redirected when the remote process is replaced.

use super::address::Address;
use super::bundle::Bundle;
use super::interface::InterfaceElement;
use super::stream::WireError;

#[derive(Debug)]
pub struct Channel {
    addr: Address,
    irregular: bool,
    bundle: Bundle,
    packets_sent: u64,
    bytes_sent: u64,
}

impl Channel {
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            irregular: false,
            bundle: Bundle::new(),
            packets_sent: 0,
            bytes_sent: 0,
        }
    }

    pub fn addr(&self) -> Address {
        self.addr
    }

    /// Redirect the channel. Queued messages go to the new target.
    pub fn set_address(&mut self, addr: Address) {
        if addr != self.addr {
            tracing::debug!("[channel] [redirect] old={} new={}", self.addr, addr);
        }
        self.addr = addr;
    }

    /// True while the channel has no target.
    pub fn is_dead(&self) -> bool {
        self.addr.is_none()
    }

    /// Irregular channels carry no assumed traffic cadence.
    pub fn is_irregular(&self) -> bool {
        self.irregular
    }

    pub fn set_irregular(&mut self, irregular: bool) {
        self.irregular = irregular;
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn bundle_mut(&mut self) -> &mut Bundle {
        &mut self.bundle
    }

    /// Queue one message for the next send.
    pub fn add_message(&mut self, element: &InterfaceElement, body: &[u8]) -> Result<(), WireError> {
        self.bundle.add_message(element, body)
    }

    pub fn has_unsent_data(&self) -> bool {
        !self.bundle.is_empty()
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }
}

/// Exclusive owner of one [`Channel`]. Dropping the owner drops the channel.
#[derive(Debug)]
pub struct ChannelOwner {
    channel: Channel,
}

impl ChannelOwner {
    pub fn new(addr: Address) -> Self {
        Self {
            channel: Channel::new(addr),
        }
    }

    pub fn addr(&self) -> Address {
        self.channel.addr()
    }

    pub fn set_addr(&mut self, addr: Address) {
        self.channel.set_address(addr);
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::interface::LengthStyle;

    #[test]
    fn test_owner_redirect_keeps_queue() {
        let a = Address::from_host(0x7F00_0001, 4000);
        let b = Address::from_host(0x7F00_0001, 4001).with_salt(9);
        let mut owner = ChannelOwner::new(a);
        let element = InterfaceElement::new(0, "ping", LengthStyle::Fixed(0));

        owner.channel_mut().add_message(&element, &[]).unwrap();
        owner.set_addr(b);

        assert_eq!(owner.addr(), b);
        assert_eq!(owner.channel().addr(), b);
        assert!(owner.channel().has_unsent_data());
    }

    #[test]
    fn test_dead_channel() {
        let mut owner = ChannelOwner::new(Address::NONE);
        assert!(owner.channel().is_dead());
        owner.set_addr(Address::from_host(0x0A00_0001, 1));
        assert!(!owner.channel().is_dead());
    }

    #[test]
    fn test_irregular_flag_and_counters() {
        let mut channel = Channel::new(Address::NONE);
        assert!(!channel.is_irregular());
        channel.set_irregular(true);
        assert!(channel.is_irregular());

        channel.record_sent(100);
        channel.record_sent(20);
        assert_eq!(channel.packets_sent(), 2);
        assert_eq!(channel.bytes_sent(), 120);
    }
}
