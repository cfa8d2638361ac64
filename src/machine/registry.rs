//! In-memory state of the process registry
//!
//! Pure bookkeeping: every mutating call returns the notifications the
//! daemon must send, so the socket loop stays trivial and the rules can be
//! tested without one.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use super::{listener_packet, ListenerKind};
use crate::network::address::Address;
use crate::network::reason::Reason;

/// A datagram the registry wants delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: Address,
    pub packet: Bytes,
}

#[derive(Debug, Clone)]
struct Listener {
    addr: Address,
    prefix: Bytes,
    suffix: Bytes,
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    // keyed by (component, index); BTreeMap keeps the lowest index first
    processes: BTreeMap<(String, i32), Address>,
    listeners: HashMap<(ListenerKind, String), Vec<Listener>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a process. A different address already holding the same name
    /// and index is replaced and announced as dead, and loses its listeners
    /// unless it is still registered elsewhere.
    pub fn register(&mut self, name: &str, index: i32, addr: Address) -> Vec<Notification> {
        let previous = self.processes.insert((name.to_string(), index), addr);
        if previous == Some(addr) {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(old) = previous {
            tracing::info!(
                "[registry] [replaced] component={} index={} old={} new={}",
                name,
                index,
                old,
                addr
            );
            out.extend(self.notify(ListenerKind::Death, name, old));
        } else {
            tracing::info!("[registry] [registered] component={} index={} addr={}", name, index, addr);
        }
        out.extend(self.notify(ListenerKind::Birth, name, addr));
        if let Some(old) = previous {
            self.forget_listeners(old);
        }
        out
    }

    /// Forget a process. Only the address that registered may deregister.
    /// Its listeners go with its last registration.
    pub fn deregister(
        &mut self,
        name: &str,
        index: i32,
        addr: Address,
    ) -> Result<Vec<Notification>, Reason> {
        let key = (name.to_string(), index);
        if self.processes.get(&key) != Some(&addr) {
            return Err(Reason::NonexistentEntry);
        }
        self.processes.remove(&key);
        tracing::info!("[registry] [deregistered] component={} index={} addr={}", name, index, addr);
        let sent = self.notify(ListenerKind::Death, name, addr);
        self.forget_listeners(addr);
        Ok(sent)
    }

    /// Find a process. `index < 0` matches the lowest-indexed instance.
    pub fn find(&self, name: &str, index: i32) -> Option<Address> {
        if index >= 0 {
            return self.processes.get(&(name.to_string(), index)).copied();
        }
        self.processes
            .range((name.to_string(), i32::MIN)..=(name.to_string(), i32::MAX))
            .next()
            .map(|(_, addr)| *addr)
    }

    /// Register interest in `name`. Re-registering the same listener address
    /// replaces its framing.
    ///
    /// Entries are removed by [`remove_listener`](Self::remove_listener) or
    /// when the listener's address leaves the registry. A listener that never
    /// registered a process and dies without deregistering stays until
    /// machined restarts.
    pub fn add_listener(
        &mut self,
        kind: ListenerKind,
        name: &str,
        addr: Address,
        prefix: Bytes,
        suffix: Bytes,
    ) {
        let entries = self.listeners.entry((kind, name.to_string())).or_default();
        entries.retain(|listener| listener.addr != addr);
        entries.push(Listener { addr, prefix, suffix });
        tracing::debug!(
            "[registry] [listener_added] kind={:?} component={} listener={}",
            kind,
            name,
            addr
        );
    }

    pub fn remove_listener(&mut self, kind: ListenerKind, name: &str, addr: Address) -> bool {
        let key = (kind, name.to_string());
        let Some(entries) = self.listeners.get_mut(&key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|listener| listener.addr != addr);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(&key);
        }
        removed
    }

    pub fn listener_count(&self, kind: ListenerKind, name: &str) -> usize {
        self.listeners
            .get(&(kind, name.to_string()))
            .map_or(0, Vec::len)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    fn forget_listeners(&mut self, addr: Address) {
        if self.processes.values().any(|registered| *registered == addr) {
            return;
        }
        let before: usize = self.listeners.values().map(Vec::len).sum();
        self.listeners.retain(|_, entries| {
            entries.retain(|listener| listener.addr != addr);
            !entries.is_empty()
        });
        let after: usize = self.listeners.values().map(Vec::len).sum();
        if before != after {
            tracing::debug!("[registry] [listeners_dropped] addr={} count={}", addr, before - after);
        }
    }

    fn notify(&self, kind: ListenerKind, name: &str, addr: Address) -> Vec<Notification> {
        self.listeners
            .get(&(kind, name.to_string()))
            .map(|entries| {
                entries
                    .iter()
                    .map(|listener| Notification {
                        to: listener.addr,
                        packet: listener_packet(&listener.prefix, &addr, &listener.suffix),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
