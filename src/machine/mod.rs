//! Process registry ("machined")
//!
//! Every server process announces itself to the registry under a component
//! name and index. Processes interested in a component register as birth or
//! death listeners; the registry then forwards the address of every process
//! that comes or goes, pre-framed as a message of the listener's choosing.
//!
//! Messages are single datagrams: `[kind:1][request_id:4][fields...]`,
//! integers little-endian, names as packed strings.

pub mod client;
pub mod daemon;
pub mod registry;

use bytes::{BufMut, Bytes, BytesMut};

use crate::network::address::Address;
use crate::network::reason::Reason;
use crate::network::stream::{
    ensure_consumed, get_blob, get_i32, get_string, get_u32, get_u8, put_blob, put_string,
    WireError,
};

/// Well-known registry port.
pub const MACHINED_PORT: u16 = 20018;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListenerKind {
    Birth = 1,
    Death = 2,
}

impl ListenerKind {
    fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            1 => Ok(ListenerKind::Birth),
            2 => Ok(ListenerKind::Death),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

const KIND_REGISTER: u8 = 1;
const KIND_DEREGISTER: u8 = 2;
const KIND_FIND: u8 = 3;
const KIND_FOUND: u8 = 4;
const KIND_REGISTER_LISTENER: u8 = 5;
const KIND_DEREGISTER_LISTENER: u8 = 6;
const KIND_ACK: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineMessage {
    Register {
        request_id: u32,
        name: String,
        index: i32,
        addr: Address,
    },
    Deregister {
        request_id: u32,
        name: String,
        index: i32,
        addr: Address,
    },
    Find {
        request_id: u32,
        name: String,
        index: i32,
    },
    /// Reply to `Find`; `Address::NONE` when nothing matched.
    Found { request_id: u32, addr: Address },
    RegisterListener {
        request_id: u32,
        kind: ListenerKind,
        name: String,
        listener: Address,
        prefix: Bytes,
        suffix: Bytes,
    },
    DeregisterListener {
        request_id: u32,
        kind: ListenerKind,
        name: String,
        listener: Address,
    },
    Ack {
        request_id: u32,
        result: Result<(), Reason>,
    },
}

impl MachineMessage {
    pub fn request_id(&self) -> u32 {
        match self {
            MachineMessage::Register { request_id, .. }
            | MachineMessage::Deregister { request_id, .. }
            | MachineMessage::Find { request_id, .. }
            | MachineMessage::Found { request_id, .. }
            | MachineMessage::RegisterListener { request_id, .. }
            | MachineMessage::DeregisterListener { request_id, .. }
            | MachineMessage::Ack { request_id, .. } => *request_id,
        }
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut out = BytesMut::with_capacity(64);
        match self {
            MachineMessage::Register { request_id, name, index, addr } => {
                out.put_u8(KIND_REGISTER);
                out.put_u32_le(*request_id);
                put_string(&mut out, name)?;
                out.put_i32_le(*index);
                addr.write_to(&mut out);
            }
            MachineMessage::Deregister { request_id, name, index, addr } => {
                out.put_u8(KIND_DEREGISTER);
                out.put_u32_le(*request_id);
                put_string(&mut out, name)?;
                out.put_i32_le(*index);
                addr.write_to(&mut out);
            }
            MachineMessage::Find { request_id, name, index } => {
                out.put_u8(KIND_FIND);
                out.put_u32_le(*request_id);
                put_string(&mut out, name)?;
                out.put_i32_le(*index);
            }
            MachineMessage::Found { request_id, addr } => {
                out.put_u8(KIND_FOUND);
                out.put_u32_le(*request_id);
                addr.write_to(&mut out);
            }
            MachineMessage::RegisterListener {
                request_id,
                kind,
                name,
                listener,
                prefix,
                suffix,
            } => {
                out.put_u8(KIND_REGISTER_LISTENER);
                out.put_u32_le(*request_id);
                out.put_u8(*kind as u8);
                put_string(&mut out, name)?;
                listener.write_to(&mut out);
                put_blob(&mut out, prefix)?;
                put_blob(&mut out, suffix)?;
            }
            MachineMessage::DeregisterListener { request_id, kind, name, listener } => {
                out.put_u8(KIND_DEREGISTER_LISTENER);
                out.put_u32_le(*request_id);
                out.put_u8(*kind as u8);
                put_string(&mut out, name)?;
                listener.write_to(&mut out);
            }
            MachineMessage::Ack { request_id, result } => {
                out.put_u8(KIND_ACK);
                out.put_u32_le(*request_id);
                out.put_u8(Reason::encode(*result));
            }
        }
        Ok(out.freeze())
    }

    /// Decode one datagram. The whole datagram must be consumed.
    pub fn decode(mut data: Bytes) -> Result<Self, WireError> {
        let kind = get_u8(&mut data)?;
        let request_id = get_u32(&mut data)?;
        let message = match kind {
            KIND_REGISTER => MachineMessage::Register {
                request_id,
                name: get_string(&mut data)?,
                index: get_i32(&mut data)?,
                addr: Address::read_from(&mut data)?,
            },
            KIND_DEREGISTER => MachineMessage::Deregister {
                request_id,
                name: get_string(&mut data)?,
                index: get_i32(&mut data)?,
                addr: Address::read_from(&mut data)?,
            },
            KIND_FIND => MachineMessage::Find {
                request_id,
                name: get_string(&mut data)?,
                index: get_i32(&mut data)?,
            },
            KIND_FOUND => MachineMessage::Found {
                request_id,
                addr: Address::read_from(&mut data)?,
            },
            KIND_REGISTER_LISTENER => MachineMessage::RegisterListener {
                request_id,
                kind: ListenerKind::from_u8(get_u8(&mut data)?)?,
                name: get_string(&mut data)?,
                listener: Address::read_from(&mut data)?,
                prefix: get_blob(&mut data)?,
                suffix: get_blob(&mut data)?,
            },
            KIND_DEREGISTER_LISTENER => MachineMessage::DeregisterListener {
                request_id,
                kind: ListenerKind::from_u8(get_u8(&mut data)?)?,
                name: get_string(&mut data)?,
                listener: Address::read_from(&mut data)?,
            },
            KIND_ACK => MachineMessage::Ack {
                request_id,
                result: Reason::decode(get_u8(&mut data)?),
            },
            other => return Err(WireError::UnknownKind(other)),
        };
        ensure_consumed(&data)?;
        Ok(message)
    }
}

/// Frame `addr` the way a listener asked for it.
pub fn listener_packet(prefix: &[u8], addr: &Address, suffix: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(prefix.len() + 8 + suffix.len());
    out.put_slice(prefix);
    addr.write_to(&mut out);
    out.put_slice(suffix);
    out.freeze()
}
