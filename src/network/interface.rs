//! Interface description and message dispatch
//!
//! An [`InterfaceMinder`] is the per-process table of message types one
//! interface understands. Elements are described once at startup with
//! [`InterfaceMinder::add`]; handlers are bound to element ids afterwards and
//! may be rebound at any time (last writer wins).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::address::{Address, ADDRESS_WIRE_SIZE};
use super::reason::Reason;
use super::stream::{ensure_remaining, WireError};

/// Wire discriminator of a message within an interface.
pub type MessageId = u8;

/// Width of a variable-length message's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    One = 1,
    Two = 2,
    Four = 4,
}

impl LengthWidth {
    fn max_len(self) -> usize {
        match self {
            LengthWidth::One => u8::MAX as usize,
            LengthWidth::Two => u16::MAX as usize,
            LengthWidth::Four => u32::MAX as usize,
        }
    }
}

/// How a message body's length is known on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthStyle {
    /// Body is always exactly this many bytes; no prefix.
    Fixed(u16),
    /// Body length precedes it as a little-endian integer of this width.
    Variable(LengthWidth),
}

/// One message type of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceElement {
    id: MessageId,
    name: Arc<str>,
    style: LengthStyle,
}

impl InterfaceElement {
    pub fn new(id: MessageId, name: &str, style: LengthStyle) -> Self {
        Self {
            id,
            name: Arc::from(name),
            style,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length_style(&self) -> LengthStyle {
        self.style
    }

    /// Bytes taken by the id and length prefix.
    pub fn header_size(&self) -> usize {
        match self.style {
            LengthStyle::Fixed(_) => 1,
            LengthStyle::Variable(width) => 1 + width as usize,
        }
    }

    /// Write the id and length prefix for a body of `body_len` bytes.
    pub fn write_header<B: BufMut>(&self, out: &mut B, body_len: usize) -> Result<(), WireError> {
        match self.style {
            LengthStyle::Fixed(len) => {
                if body_len != len as usize {
                    return Err(WireError::LengthMismatch {
                        id: self.id,
                        expected: len as usize,
                        actual: body_len,
                    });
                }
                out.put_u8(self.id);
            }
            LengthStyle::Variable(width) => {
                if body_len > width.max_len() {
                    return Err(WireError::BodyTooLarge {
                        len: body_len,
                        width: width as u8,
                    });
                }
                out.put_u8(self.id);
                out.put_uint_le(body_len as u64, width as usize);
            }
        }
        Ok(())
    }

    /// Read the body length that follows this element's id.
    pub fn read_length<B: Buf>(&self, input: &mut B) -> Result<usize, WireError> {
        match self.style {
            LengthStyle::Fixed(len) => Ok(len as usize),
            LengthStyle::Variable(width) => {
                ensure_remaining(input, width as usize)?;
                Ok(input.get_uint_le(width as usize) as usize)
            }
        }
    }

    /// Header bytes that turn a bare 8-byte [`Address`] into a complete
    /// message of this type. Registries prepend this to the address they
    /// announce, so they never need to know the listener's interface.
    pub fn birth_prefix(&self) -> Result<Bytes, WireError> {
        let mut out = BytesMut::with_capacity(self.header_size());
        self.write_header(&mut out, ADDRESS_WIRE_SIZE)?;
        Ok(out.freeze())
    }
}

/// What a handler learns about the message it is handed.
#[derive(Debug, Clone)]
pub struct UnpackedMessageHeader {
    pub identifier: MessageId,
    pub name: Arc<str>,
    pub length: usize,
}

/// Receiver of one message type.
pub trait InputMessageHandler: Send + Sync {
    fn handle_message(&self, source: &Address, header: &UnpackedMessageHeader, data: &mut Bytes);
}

impl<F> InputMessageHandler for F
where
    F: Fn(&Address, &UnpackedMessageHeader, &mut Bytes) + Send + Sync,
{
    fn handle_message(&self, source: &Address, header: &UnpackedMessageHeader, data: &mut Bytes) {
        self(source, header, data)
    }
}

/// Per-process dispatch table for one interface.
pub struct InterfaceMinder {
    name: String,
    elements: Vec<InterfaceElement>,
    handlers: RwLock<HashMap<MessageId, Arc<dyn InputMessageHandler>>>,
}

impl InterfaceMinder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            elements: Vec::new(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Describe the next message type. Ids are handed out in order from 0.
    ///
    /// # Panics
    ///
    /// Panics if the interface already has 256 elements.
    pub fn add(&mut self, name: &str, style: LengthStyle) -> InterfaceElement {
        let id = MessageId::try_from(self.elements.len())
            .unwrap_or_else(|_| panic!("interface {} has more than 256 messages", self.name));
        let element = InterfaceElement::new(id, name, style);
        self.elements.push(element.clone());
        element
    }

    pub fn element(&self, id: MessageId) -> Option<&InterfaceElement> {
        self.elements.get(id as usize)
    }

    pub fn elements(&self) -> &[InterfaceElement] {
        &self.elements
    }

    /// Bind `handler` to message `id`, replacing any previous binding.
    pub fn handler(&self, id: MessageId, handler: Arc<dyn InputMessageHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.insert(id, handler).is_some() {
            tracing::debug!("[minder] [handler_replaced] interface={} id={}", self.name, id);
        }
    }

    /// Unbind message `id`, but only if `handler` is what is bound to it.
    pub fn remove_handler(&self, id: MessageId, handler: &Arc<dyn InputMessageHandler>) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.get(&id) {
            Some(bound) if Arc::ptr_eq(bound, handler) => {
                handlers.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn handler_for(&self, id: MessageId) -> Option<Arc<dyn InputMessageHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&id).cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Hand one message body to the handler bound to `id`.
    ///
    /// The handler runs without any lock held, so it may rebind handlers.
    pub fn dispatch(&self, source: &Address, id: MessageId, mut body: Bytes) -> Result<(), Reason> {
        let element = self.element(id).ok_or(Reason::CorruptedPacket)?;
        let handler = self.handler_for(id).ok_or(Reason::NonexistentEntry)?;
        let header = UnpackedMessageHeader {
            identifier: id,
            name: element.name.clone(),
            length: body.len(),
        };
        handler.handle_message(source, &header, &mut body);
        Ok(())
    }
}

impl fmt::Debug for InterfaceMinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceMinder")
            .field("name", &self.name)
            .field("elements", &self.elements)
            .field("handlers", &self.handler_count())
            .finish()
    }
}
