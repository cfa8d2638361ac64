//! Network endpoint identity
//!
//! An [`Address`] names one endpoint of the fleet: IPv4 address and UDP port,
//! both held in network byte order, plus a 16-bit salt that tells successive
//! process instances on the same ip:port apart.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Buf, BufMut};

use super::stream::{ensure_remaining, WireError};

/// Size of an address on the wire: 4 (ip) + 2 (port) + 2 (salt).
pub const ADDRESS_WIRE_SIZE: usize = 8;

/// A network endpoint.
///
/// `ip` and `port` are stored exactly as they appear in a `sockaddr_in`
/// (network byte order). Equality is bitwise over all three fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// IPv4 address, network byte order.
    pub ip: u32,
    /// UDP port, network byte order.
    pub port: u16,
    /// Instance salt.
    pub salt: u16,
}

impl Address {
    /// The unbound sentinel.
    pub const NONE: Address = Address { ip: 0, port: 0, salt: 0 };

    /// Build from network-byte-order `ip` and `port`.
    pub const fn new(ip: u32, port: u16) -> Self {
        Self { ip, port, salt: 0 }
    }

    /// Build from host-byte-order values.
    pub fn from_host(ip: u32, port: u16) -> Self {
        Self::new(ip.to_be(), port.to_be())
    }

    pub fn with_salt(mut self, salt: u16) -> Self {
        self.salt = salt;
        self
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// The IPv4 address in host order.
    pub fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.ip))
    }

    /// The port in host order.
    pub fn host_port(&self) -> u16 {
        u16::from_be(self.port)
    }

    /// Socket address for this endpoint. The salt is not part of it.
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ipv4(), self.host_port())
    }

    /// Render `"A.B.C.D:port"` into `buf`, always leaving a terminating NUL.
    ///
    /// Returns the number of characters written, not counting the NUL. Output
    /// that does not fit is truncated.
    pub fn write_to_string(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let rendered = self.to_string();
        let n = rendered.len().min(buf.len() - 1);
        buf[..n].copy_from_slice(&rendered.as_bytes()[..n]);
        buf[n] = 0;
        n
    }

    /// Owned rendering of the address.
    ///
    /// Every call allocates a fresh string, so results from different threads
    /// never alias each other.
    pub fn c_str(&self) -> String {
        self.to_string()
    }

    /// Append the 8-byte wire form.
    ///
    /// `ip` and `port` are copied raw (no byte swapping, they are already in
    /// network order); `salt` follows the stream convention (little-endian).
    pub fn write_to<B: BufMut>(&self, out: &mut B) {
        out.put_slice(&self.ip.to_ne_bytes());
        out.put_slice(&self.port.to_ne_bytes());
        out.put_u16_le(self.salt);
    }

    /// Read the 8-byte wire form written by [`Address::write_to`].
    pub fn read_from<B: Buf>(input: &mut B) -> Result<Self, WireError> {
        ensure_remaining(input, ADDRESS_WIRE_SIZE)?;
        let mut ip = [0u8; 4];
        input.copy_to_slice(&mut ip);
        let mut port = [0u8; 2];
        input.copy_to_slice(&mut port);
        let salt = input.get_u16_le();
        Ok(Self {
            ip: u32::from_ne_bytes(ip),
            port: u16::from_ne_bytes(port),
            salt,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = u32::from_be(self.ip);
        write!(
            f,
            "{}.{}.{}.{}:{}",
            (ip >> 24) & 0xFF,
            (ip >> 16) & 0xFF,
            (ip >> 8) & 0xFF,
            ip & 0xFF,
            self.host_port()
        )
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self::from_host(u32::from(*addr.ip()), addr.port())
    }
}

impl TryFrom<SocketAddr> for Address {
    type Error = WireError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::from(v4)),
            SocketAddr::V6(v6) => Err(WireError::UnsupportedAddress(v6.to_string())),
        }
    }
}
