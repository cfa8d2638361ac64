use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;

use super::registry::{Notification, ProcessRegistry};
use super::MachineMessage;
use crate::network::address::Address;
use crate::network::bundle::MAX_PACKET_SIZE;
use crate::network::reason::Reason;

/// Registry daemon: answers queries on one UDP socket and forwards
/// birth/death notifications to listeners.
pub struct MachineDaemon {
    socket: UdpSocket,
    registry: ProcessRegistry,
}

impl MachineDaemon {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind registry socket {addr}"))?;
        Ok(Self {
            socket,
            registry: ProcessRegistry::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!("[machined] [ready] addr={}", self.local_addr()?);
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            let Some((n, peer)) = received(self.socket.recv_from(&mut buf).await) else {
                continue;
            };
            let message = match MachineMessage::decode(Bytes::copy_from_slice(&buf[..n])) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("[machined] [bad_datagram] peer={} len={} error={}", peer, n, e);
                    continue;
                }
            };
            let (reply, notifications) = self.handle(message);
            for notification in notifications {
                let target = notification.to.socket_addr();
                if let Err(e) = self.socket.send_to(&notification.packet, target).await {
                    tracing::warn!("[machined] [notify_failed] to={} error={}", notification.to, e);
                }
            }
            if let Some(reply) = reply {
                match reply.encode() {
                    Ok(bytes) => {
                        if let Err(e) = self.socket.send_to(&bytes, peer).await {
                            tracing::warn!("[machined] [reply_failed] peer={} error={}", peer, e);
                        }
                    }
                    Err(e) => tracing::error!("[machined] [encode_failed] error={}", e),
                }
            }
        }
    }

    /// Apply one request. Returns the reply for the requester and the
    /// notifications owed to listeners.
    pub fn handle(&mut self, message: MachineMessage) -> (Option<MachineMessage>, Vec<Notification>) {
        let request_id = message.request_id();
        let ack = |result| Some(MachineMessage::Ack { request_id, result });
        match message {
            MachineMessage::Register { name, index, addr, .. } => {
                let sent = self.registry.register(&name, index, addr);
                (ack(Ok(())), sent)
            }
            MachineMessage::Deregister { name, index, addr, .. } => {
                match self.registry.deregister(&name, index, addr) {
                    Ok(sent) => (ack(Ok(())), sent),
                    Err(reason) => (ack(Err(reason)), Vec::new()),
                }
            }
            MachineMessage::Find { name, index, .. } => {
                let addr = self.registry.find(&name, index).unwrap_or(Address::NONE);
                tracing::debug!("[machined] [find] component={} index={} found={}", name, index, addr);
                (Some(MachineMessage::Found { request_id, addr }), Vec::new())
            }
            MachineMessage::RegisterListener {
                kind,
                name,
                listener,
                prefix,
                suffix,
                ..
            } => {
                self.registry.add_listener(kind, &name, listener, prefix, suffix);
                (ack(Ok(())), Vec::new())
            }
            MachineMessage::DeregisterListener { kind, name, listener, .. } => {
                let result = if self.registry.remove_listener(kind, &name, listener) {
                    Ok(())
                } else {
                    Err(Reason::NonexistentEntry)
                };
                (ack(result), Vec::new())
            }
            MachineMessage::Found { .. } | MachineMessage::Ack { .. } => {
                tracing::warn!("[machined] [unexpected_reply] request_id={}", request_id);
                (None, Vec::new())
            }
        }
    }
}

/// A failed receive is logged and skipped; it never stops the daemon.
fn received(result: std::io::Result<(usize, SocketAddr)>) -> Option<(usize, SocketAddr)> {
    match result {
        Ok(received) => Some(received),
        Err(e) => {
            tracing::warn!("[machined] [recv_failed] error={}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::ListenerKind;

    fn addr(port: u16) -> Address {
        Address::from_host(0x7F00_0001, port).with_salt(3)
    }

    #[tokio::test]
    async fn test_handle_register_find_deregister() {
        let mut daemon = MachineDaemon::bind("127.0.0.1:0").await.unwrap();

        let (reply, sent) = daemon.handle(MachineMessage::Register {
            request_id: 1,
            name: "dbmgr".into(),
            index: 0,
            addr: addr(4000),
        });
        assert_eq!(reply, Some(MachineMessage::Ack { request_id: 1, result: Ok(()) }));
        assert!(sent.is_empty());

        let (reply, _) = daemon.handle(MachineMessage::Find {
            request_id: 2,
            name: "dbmgr".into(),
            index: -1,
        });
        assert_eq!(reply, Some(MachineMessage::Found { request_id: 2, addr: addr(4000) }));

        let (reply, _) = daemon.handle(MachineMessage::Deregister {
            request_id: 3,
            name: "dbmgr".into(),
            index: 0,
            addr: addr(4000),
        });
        assert_eq!(reply, Some(MachineMessage::Ack { request_id: 3, result: Ok(()) }));

        let (reply, _) = daemon.handle(MachineMessage::Find {
            request_id: 4,
            name: "dbmgr".into(),
            index: -1,
        });
        assert_eq!(reply, Some(MachineMessage::Found { request_id: 4, addr: Address::NONE }));
    }

    #[tokio::test]
    async fn test_handle_listener_lifecycle() {
        let mut daemon = MachineDaemon::bind("127.0.0.1:0").await.unwrap();
        let listener = addr(9000);

        daemon.handle(MachineMessage::RegisterListener {
            request_id: 1,
            kind: ListenerKind::Birth,
            name: "cellapp".into(),
            listener,
            prefix: Bytes::from_static(&[7]),
            suffix: Bytes::new(),
        });
        let (_, sent) = daemon.handle(MachineMessage::Register {
            request_id: 2,
            name: "cellapp".into(),
            index: 0,
            addr: addr(5000),
        });
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, listener);

        let (reply, _) = daemon.handle(MachineMessage::DeregisterListener {
            request_id: 3,
            kind: ListenerKind::Birth,
            name: "cellapp".into(),
            listener,
        });
        assert_eq!(reply, Some(MachineMessage::Ack { request_id: 3, result: Ok(()) }));

        let (reply, _) = daemon.handle(MachineMessage::DeregisterListener {
            request_id: 4,
            kind: ListenerKind::Birth,
            name: "cellapp".into(),
            listener,
        });
        assert_eq!(
            reply,
            Some(MachineMessage::Ack { request_id: 4, result: Err(Reason::NonexistentEntry) })
        );
        assert_eq!(daemon.registry().listener_count(ListenerKind::Birth, "cellapp"), 0);
    }

    #[test]
    fn test_receive_error_is_skipped() {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(received(Err(refused)), None);

        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(received(Ok((12, peer))), Some((12, peer)));
    }

    #[tokio::test]
    async fn test_run_keeps_serving_after_bad_datagrams() {
        let daemon = MachineDaemon::bind("127.0.0.1:0").await.unwrap();
        let machined = daemon.local_addr().unwrap();
        tokio::spawn(daemon.run());

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&[0xEE, 1, 2], machined).await.unwrap();
        socket.send_to(&vec![1u8; MAX_PACKET_SIZE * 2], machined).await.unwrap();

        let request = MachineMessage::Register {
            request_id: 77,
            name: "baseappmgr".into(),
            index: 0,
            addr: addr(6000),
        };
        socket.send_to(&request.encode().unwrap(), machined).await.unwrap();

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = MachineMessage::decode(Bytes::copy_from_slice(&buf[..n])).unwrap();
        assert_eq!(reply, MachineMessage::Ack { request_id: 77, result: Ok(()) });
    }

    #[tokio::test]
    async fn test_replies_are_not_requests() {
        let mut daemon = MachineDaemon::bind("127.0.0.1:0").await.unwrap();
        let (reply, sent) = daemon.handle(MachineMessage::Ack { request_id: 1, result: Ok(()) });
        assert!(reply.is_none());
        assert!(sent.is_empty());
    }
}
