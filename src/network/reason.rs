//! Transport reason codes
//!
//! Success is `Ok(..)`; every other outcome is a [`Reason`]. Callers in this
//! crate only ever distinguish Ok from Err.

/// Why a transport operation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(u8)]
pub enum Reason {
    #[error("timer expired")]
    TimerExpired = 1,
    #[error("no such port")]
    NoSuchPort = 2,
    #[error("general network error")]
    GeneralNetwork = 3,
    #[error("corrupted packet")]
    CorruptedPacket = 4,
    #[error("nonexistent entry")]
    NonexistentEntry = 5,
    #[error("window overflow")]
    WindowOverflow = 6,
    #[error("inactivity")]
    Inactivity = 7,
    #[error("resource unavailable")]
    ResourceUnavailable = 8,
    #[error("transmit queue full")]
    TransmitQueueFull = 9,
    #[error("channel lost")]
    ChannelLost = 10,
    #[error("shutting down")]
    ShuttingDown = 11,
}

impl Reason {
    /// Wire value of a result: 0 for success, the reason code otherwise.
    pub fn encode(result: Result<(), Reason>) -> u8 {
        match result {
            Ok(()) => 0,
            Err(reason) => reason as u8,
        }
    }

    /// Inverse of [`Reason::encode`]. Unknown codes map to `GeneralNetwork`.
    pub fn decode(code: u8) -> Result<(), Reason> {
        match code {
            0 => Ok(()),
            1 => Err(Reason::TimerExpired),
            2 => Err(Reason::NoSuchPort),
            3 => Err(Reason::GeneralNetwork),
            4 => Err(Reason::CorruptedPacket),
            5 => Err(Reason::NonexistentEntry),
            6 => Err(Reason::WindowOverflow),
            7 => Err(Reason::Inactivity),
            8 => Err(Reason::ResourceUnavailable),
            9 => Err(Reason::TransmitQueueFull),
            10 => Err(Reason::ChannelLost),
            11 => Err(Reason::ShuttingDown),
            _ => Err(Reason::GeneralNetwork),
        }
    }

    /// Map a socket error onto the nearest reason.
    pub fn from_io(err: &std::io::Error) -> Reason {
        match err.kind() {
            std::io::ErrorKind::WouldBlock => Reason::TransmitQueueFull,
            std::io::ErrorKind::ConnectionRefused => Reason::NoSuchPort,
            std::io::ErrorKind::TimedOut => Reason::TimerExpired,
            _ => Reason::GeneralNetwork,
        }
    }
}
