//! Messaging transport: addresses, wire framing, channels and the nub.

pub mod address;
pub mod bundle;
pub mod channel;
pub mod interface;
pub mod nub;
pub mod reason;
pub mod stream;
pub mod transport;

pub use address::Address;
pub use bundle::{Bundle, MessageReader, MAX_PACKET_SIZE};
pub use channel::{Channel, ChannelOwner};
pub use interface::{
    InputMessageHandler, InterfaceElement, InterfaceMinder, LengthStyle, LengthWidth, MessageId,
    UnpackedMessageHeader,
};
pub use nub::Nub;
pub use reason::Reason;
pub use stream::WireError;
pub use transport::Transport;
