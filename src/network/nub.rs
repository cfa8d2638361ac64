//! The per-process transport
//!
//! A [`Nub`] owns the process's UDP socket and salted [`Address`], decodes
//! inbound packets against the served [`InterfaceMinder`], and runs timers.
//! All handlers and timer callbacks run on the task calling
//! [`Nub::process_until_break`], one at a time.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::address::Address;
use super::bundle::{Bundle, MessageReader, MAX_PACKET_SIZE};
use super::channel::Channel;
use super::interface::{InterfaceElement, InterfaceMinder};
use super::reason::Reason;
use super::transport::Transport;
use crate::config::MercuryConfig;
use crate::machine::client::MachineClient;
use crate::machine::ListenerKind;
use crate::timer::{TimeQueue, TimerHandle};

/// Work scheduled on the nub's clock.
pub type TimerCallback = Box<dyn FnMut(&Nub, TimerHandle) + Send>;

pub struct Nub {
    socket: UdpSocket,
    address: Address,
    served: RwLock<Option<Arc<InterfaceMinder>>>,
    machine: MachineClient,
    timers: Mutex<TimeQueue<TimerCallback>>,
    epoch: Instant,
    breaking: AtomicBool,
    wake: Notify,
}

impl Nub {
    pub async fn bind(
        internal: SocketAddrV4,
        machined: SocketAddrV4,
        query_timeout: Duration,
        retry_delay: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(internal)
            .await
            .with_context(|| format!("failed to bind nub socket {internal}"))?;
        let local = match socket.local_addr()? {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(v6) => anyhow::bail!("nub bound to non-IPv4 address {v6}"),
        };
        if local.ip().is_unspecified() {
            tracing::warn!("[nub] [unspecified_ip] addr={} peers cannot reach this address", local);
        }
        let address = Address::from(local).with_salt(rand::random::<u16>());
        let machine = MachineClient::bind(machined, query_timeout, retry_delay)
            .await
            .context("failed to bind registry query socket")?;

        tracing::info!("[nub] [bound] addr={} salt={} machined={}", address, address.salt, machined);
        Ok(Self {
            socket,
            address,
            served: RwLock::new(None),
            machine,
            timers: Mutex::new(TimeQueue::new()),
            epoch: Instant::now(),
            breaking: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    pub async fn from_config(config: &MercuryConfig) -> Result<Self> {
        Self::bind(
            config.internal_addr()?,
            config.machined_addr()?,
            config.query_timeout(),
            config.retry_delay(),
        )
        .await
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn machine(&self) -> &MachineClient {
        &self.machine
    }

    /// Decode inbound packets against `minder` from now on.
    pub fn serve_interface(&self, minder: Arc<InterfaceMinder>) {
        tracing::debug!("[nub] [serve] interface={}", minder.name());
        *self.served.write().unwrap_or_else(PoisonError::into_inner) = Some(minder);
    }

    pub fn served_interface(&self) -> Option<Arc<InterfaceMinder>> {
        self.served.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Announce this process to the registry under `name`/`index`.
    pub async fn register_interface(&self, name: &str, index: i32) -> Result<(), Reason> {
        self.machine.register(name, index, self.address).await?;
        tracing::info!("[nub] [registered] component={} index={} addr={}", name, index, self.address);
        Ok(())
    }

    pub async fn deregister_interface(&self, name: &str, index: i32) -> Result<(), Reason> {
        self.machine.deregister(name, index, self.address).await?;
        tracing::info!("[nub] [deregistered] component={} index={}", name, index);
        Ok(())
    }

    /// Send the channel's queued bundle as one datagram without waiting.
    ///
    /// A dead channel fails with [`Reason::NoSuchPort`] and keeps its
    /// queue, as does a full socket buffer. Returns the bytes sent.
    pub fn send(&self, channel: &mut Channel) -> Result<usize, Reason> {
        if !channel.has_unsent_data() {
            return Ok(0);
        }
        if channel.is_dead() {
            tracing::debug!(
                "[nub] [send_dead] queued={} bytes={}",
                channel.bundle().message_count(),
                channel.bundle().len()
            );
            return Err(Reason::NoSuchPort);
        }
        let addr = channel.addr();
        let sent = self.send_to(addr, channel.bundle_mut())?;
        channel.record_sent(sent);
        Ok(sent)
    }

    /// Send `bundle` to `addr`, emptying it on success.
    pub fn send_to(&self, addr: Address, bundle: &mut Bundle) -> Result<usize, Reason> {
        if bundle.is_empty() {
            return Ok(0);
        }
        if addr.is_none() {
            return Err(Reason::NoSuchPort);
        }
        match self.socket.try_send_to(bundle.as_bytes(), SocketAddr::V4(addr.socket_addr())) {
            Ok(n) => {
                tracing::trace!("[nub] [sent] to={} bytes={} messages={}", addr, n, bundle.message_count());
                bundle.clear();
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Reason::TransmitQueueFull),
            Err(e) => {
                tracing::warn!("[nub] [send_failed] to={} error={}", addr, e);
                Err(Reason::from_io(&e))
            }
        }
    }

    /// Seconds since the nub was created, the clock timers run on.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Run `callback` once after `delay`.
    pub fn register_callback<F>(&self, delay: Duration, source: &str, callback: F) -> TimerHandle
    where
        F: FnMut(&Nub, TimerHandle) + Send + 'static,
    {
        self.add_timer(delay, None, source, Box::new(callback))
    }

    /// Run `callback` every `interval`, first after one interval.
    pub fn register_timer<F>(&self, interval: Duration, source: &str, callback: F) -> TimerHandle
    where
        F: FnMut(&Nub, TimerHandle) + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        self.add_timer(interval, Some(interval), source, Box::new(callback))
    }

    pub fn cancel_timer(&self, handle: TimerHandle) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel(handle)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Ask [`Nub::process_until_break`] to return after the current handler.
    pub fn break_processing(&self) {
        self.breaking.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// The event loop: receive and dispatch packets, fire timers, until
    /// [`Nub::break_processing`] is called.
    pub async fn process_until_break(&self) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            self.fire_timers();
            if self.breaking.swap(false, Ordering::SeqCst) {
                tracing::debug!("[nub] [break] addr={}", self.address);
                return;
            }
            let deadline = self.next_deadline();
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = sleep_until(deadline) => {}
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, peer)) => self.handle_packet(peer, Bytes::copy_from_slice(&buf[..n])),
                    Err(e) => tracing::warn!("[nub] [recv_failed] error={}", e),
                },
            }
        }
    }

    fn add_timer(
        &self,
        delay: Duration,
        interval: Option<Duration>,
        source: &str,
        callback: TimerCallback,
    ) -> TimerHandle {
        let time = self.now() + delay.as_secs_f64();
        let handle = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(time, interval.map(|i| i.as_secs_f64()), source, callback);
        // the loop may be asleep on a later deadline
        self.wake.notify_one();
        handle
    }

    fn next_deadline(&self) -> Option<Instant> {
        let next = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_expiry()?;
        Some(self.epoch + Duration::from_secs_f64(next.max(0.0)))
    }

    fn fire_timers(&self) {
        let now = self.now();
        loop {
            let expired = self
                .timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_expired(now);
            let Some(mut expired) = expired else {
                break;
            };
            (expired.payload)(self, expired.handle);
            if expired.is_repeating() {
                self.timers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reschedule(expired);
            }
        }
    }

    fn handle_packet(&self, peer: SocketAddr, data: Bytes) {
        let source = match Address::try_from(peer) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!("[nub] [bad_source] peer={} error={}", peer, e);
                return;
            }
        };
        let Some(minder) = self.served_interface() else {
            tracing::debug!("[nub] [no_interface] from={} bytes={}", source, data.len());
            return;
        };
        for message in MessageReader::new(&minder, data) {
            match message {
                Ok((id, body)) => {
                    if let Err(reason) = minder.dispatch(&source, id, body) {
                        tracing::warn!(
                            "[nub] [dispatch_failed] interface={} id={} from={} reason={}",
                            minder.name(),
                            id,
                            source,
                            reason
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!("[nub] [bad_packet] from={} error={}", source, e);
                }
            }
        }
    }

    async fn add_listener(
        &self,
        kind: ListenerKind,
        element: &InterfaceElement,
        component: &str,
    ) -> Result<(), Reason> {
        let prefix = element.birth_prefix().map_err(|_| Reason::CorruptedPacket)?;
        self.machine
            .add_listener(kind, component, self.address, prefix, Bytes::new())
            .await
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Transport for Nub {
    fn address(&self) -> Address {
        self.address
    }

    async fn register_birth_listener(
        &self,
        birth: &InterfaceElement,
        component: &str,
    ) -> Result<(), Reason> {
        self.add_listener(ListenerKind::Birth, birth, component).await
    }

    async fn deregister_birth_listener(
        &self,
        _birth: &InterfaceElement,
        component: &str,
    ) -> Result<(), Reason> {
        self.machine
            .remove_listener(ListenerKind::Birth, component, self.address)
            .await
    }

    async fn register_death_listener(
        &self,
        death: &InterfaceElement,
        component: &str,
    ) -> Result<(), Reason> {
        self.add_listener(ListenerKind::Death, death, component).await
    }

    async fn deregister_death_listener(
        &self,
        _death: &InterfaceElement,
        component: &str,
    ) -> Result<(), Reason> {
        self.machine
            .remove_listener(ListenerKind::Death, component, self.address)
            .await
    }

    async fn find_interface(
        &self,
        component: &str,
        index: i32,
        retries: u32,
    ) -> Result<Address, Reason> {
        self.machine.find(component, index, retries).await
    }
}
