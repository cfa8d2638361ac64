//! Channel to a singleton component that follows it across restarts
//!
//! [`AnonymousChannelClient::init`] finds a running instance of a named
//! component and binds a channel to it. It also listens for that
//! component's birth message, so when a replacement instance starts the
//! channel is redirected in place. The channel exists from `init` on even
//! when nothing was found; it then targets [`Address::NONE`] until the first
//! birth message arrives.
//!
//! Birth messages are applied in arrival order and the last one wins. There
//! is no generation check, so a delayed announcement of an older instance
//! would redirect the channel back to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use thiserror::Error;

use crate::network::address::Address;
use crate::network::channel::ChannelOwner;
use crate::network::interface::{
    InputMessageHandler, InterfaceElement, InterfaceMinder, UnpackedMessageHeader,
};
use crate::network::reason::Reason;
use crate::network::stream::ensure_consumed;
use crate::network::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("birth listener registration for {component} failed: {reason}")]
    ListenerRegistration { component: String, reason: Reason },
    #[error("no running {component} found: {reason}")]
    NotFound { component: String, reason: Reason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Bound,
    Unbound,
}

/// Applies birth messages to the shared channel owner.
struct BirthHandler {
    name: String,
    owner: Arc<Mutex<ChannelOwner>>,
    rebinds: Arc<AtomicU64>,
}

impl InputMessageHandler for BirthHandler {
    fn handle_message(&self, source: &Address, header: &UnpackedMessageHeader, data: &mut Bytes) {
        let decoded = Address::read_from(data).and_then(|addr| ensure_consumed(&*data).map(|()| addr));
        let addr = match decoded {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(
                    "[anon] [bad_birth] name={} message={} from={} len={} error={}",
                    self.name,
                    header.name,
                    source,
                    header.length,
                    e
                );
                return;
            }
        };

        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        let old = owner.addr();
        if old == addr {
            tracing::debug!("[anon] [birth_unchanged] name={} addr={}", self.name, addr);
            return;
        }
        owner.set_addr(addr);
        self.rebinds.fetch_add(1, Ordering::Relaxed);
        tracing::info!("[anon] [rebind] name={} old={} new={}", self.name, old, addr);
    }
}

pub struct AnonymousChannelClient {
    name: String,
    birth: InterfaceElement,
    minder: Arc<InterfaceMinder>,
    owner: Arc<Mutex<ChannelOwner>>,
    handler: Arc<dyn InputMessageHandler>,
    rebinds: Arc<AtomicU64>,
    listening: bool,
}

impl AnonymousChannelClient {
    /// Bind a channel to the component `name`.
    ///
    /// The birth handler is installed on `minder` before anything else, so
    /// births announced during discovery are not lost. A discovery result
    /// only binds the channel if no birth message has done so meanwhile.
    ///
    /// The client is always returned. The result reports whether the
    /// listener registration and the lookup both succeeded; the first
    /// failure is the one reported.
    pub async fn init<T: Transport>(
        transport: &T,
        minder: Arc<InterfaceMinder>,
        birth: &InterfaceElement,
        name: &str,
        retries: u32,
    ) -> (Self, Result<(), ClientError>) {
        let owner = Arc::new(Mutex::new(ChannelOwner::new(Address::NONE)));
        owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channel_mut()
            .set_irregular(true);

        let rebinds = Arc::new(AtomicU64::new(0));
        let handler: Arc<dyn InputMessageHandler> = Arc::new(BirthHandler {
            name: name.to_string(),
            owner: Arc::clone(&owner),
            rebinds: Arc::clone(&rebinds),
        });
        minder.handler(birth.id(), Arc::clone(&handler));

        let mut client = Self {
            name: name.to_string(),
            birth: birth.clone(),
            minder,
            owner,
            handler,
            rebinds,
            listening: false,
        };

        let mut result = Ok(());
        match transport.register_birth_listener(birth, name).await {
            Ok(()) => client.listening = true,
            Err(reason) => {
                tracing::error!("[anon] [listener_failed] name={} reason={}", name, reason);
                result = Err(ClientError::ListenerRegistration {
                    component: name.to_string(),
                    reason,
                });
            }
        }

        match transport.find_interface(name, -1, retries).await {
            Ok(addr) => {
                let mut owner = client.owner.lock().unwrap_or_else(PoisonError::into_inner);
                if owner.addr().is_none() {
                    owner.set_addr(addr);
                    tracing::info!("[anon] [bound] name={} addr={}", name, addr);
                } else {
                    tracing::debug!(
                        "[anon] [find_superseded] name={} found={} current={}",
                        name,
                        addr,
                        owner.addr()
                    );
                }
            }
            Err(reason) => {
                tracing::warn!(
                    "[anon] [not_found] name={} retries={} reason={}",
                    name,
                    retries,
                    reason
                );
                if result.is_ok() {
                    result = Err(ClientError::NotFound {
                        component: name.to_string(),
                        reason,
                    });
                }
            }
        }

        (client, result)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owned channel. Do not hold the guard across an `.await`.
    pub fn channel(&self) -> MutexGuard<'_, ChannelOwner> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn addr(&self) -> Address {
        self.channel().addr()
    }

    pub fn is_bound(&self) -> bool {
        !self.addr().is_none()
    }

    pub fn state(&self) -> ClientState {
        if self.is_bound() {
            ClientState::Bound
        } else {
            ClientState::Unbound
        }
    }

    /// Number of times a birth message redirected the channel.
    pub fn rebind_count(&self) -> u64 {
        self.rebinds.load(Ordering::Relaxed)
    }

    /// Stop following births: unbind the handler (unless something else has
    /// replaced it) and deregister the birth listener.
    pub async fn close<T: Transport>(mut self, transport: &T) -> Result<(), Reason> {
        self.unbind_handler();
        if !self.listening {
            return Ok(());
        }
        self.listening = false;
        transport
            .deregister_birth_listener(&self.birth, &self.name)
            .await
            .inspect_err(|reason| {
                tracing::warn!("[anon] [deregister_failed] name={} reason={}", self.name, reason);
            })
    }

    fn unbind_handler(&self) {
        if self.minder.remove_handler(self.birth.id(), &self.handler) {
            tracing::debug!("[anon] [handler_removed] name={}", self.name);
        }
    }
}

impl Drop for AnonymousChannelClient {
    fn drop(&mut self) {
        self.unbind_handler();
        if self.listening {
            tracing::debug!("[anon] [dropped_listening] name={} listener left registered", self.name);
        }
    }
}
