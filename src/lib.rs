//! Mercury - server messaging core
//!
//! Connectionless, message-oriented transport that binds a fleet of server
//! processes together: endpoint addresses, channels that follow a component
//! across restarts, per-interface dispatch, birth/death discovery through a
//! process registry, and remote log forwarding.

// ============================================
// Transport
// ============================================

/// Process configuration (YAML)
pub mod config;
/// Addresses, framing, channels, the nub
pub mod network;
/// Timer bookkeeping for the nub
pub mod timer;

// ============================================
// Discovery and component glue
// ============================================

/// Process registry daemon, its protocol and client
pub mod machine;
/// Anonymous channel client
pub mod servers;

// ============================================
// Remote logging
// ============================================

/// printf-style argument marshalling and log frames
pub mod logging;
