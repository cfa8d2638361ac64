use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use super::{ListenerKind, MachineMessage};
use crate::network::address::Address;
use crate::network::bundle::MAX_PACKET_SIZE;
use crate::network::reason::Reason;

/// Attempts made for requests that expect an acknowledgement.
const ACK_ATTEMPTS: u32 = 3;

/// Request/reply client for the registry daemon.
///
/// Queries go out from a private socket so replies never mix with a nub's
/// message traffic. One query is in flight at a time.
pub struct MachineClient {
    socket: Mutex<UdpSocket>,
    machined: SocketAddr,
    query_timeout: Duration,
    retry_delay: Duration,
}

impl MachineClient {
    pub async fn bind(
        machined: SocketAddrV4,
        query_timeout: Duration,
        retry_delay: Duration,
    ) -> std::io::Result<Self> {
        let local = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0);
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            socket: Mutex::new(socket),
            machined: SocketAddr::V4(machined),
            query_timeout,
            retry_delay,
        })
    }

    pub fn machined(&self) -> SocketAddr {
        self.machined
    }

    pub async fn register(&self, name: &str, index: i32, addr: Address) -> Result<(), Reason> {
        let request = MachineMessage::Register {
            request_id: rand::random::<u32>(),
            name: name.to_string(),
            index,
            addr,
        };
        Self::acked(self.query(request, ACK_ATTEMPTS).await?)
    }

    pub async fn deregister(&self, name: &str, index: i32, addr: Address) -> Result<(), Reason> {
        let request = MachineMessage::Deregister {
            request_id: rand::random::<u32>(),
            name: name.to_string(),
            index,
            addr,
        };
        Self::acked(self.query(request, ACK_ATTEMPTS).await?)
    }

    pub async fn add_listener(
        &self,
        kind: ListenerKind,
        name: &str,
        listener: Address,
        prefix: Bytes,
        suffix: Bytes,
    ) -> Result<(), Reason> {
        let request = MachineMessage::RegisterListener {
            request_id: rand::random::<u32>(),
            kind,
            name: name.to_string(),
            listener,
            prefix,
            suffix,
        };
        Self::acked(self.query(request, ACK_ATTEMPTS).await?)
    }

    pub async fn remove_listener(
        &self,
        kind: ListenerKind,
        name: &str,
        listener: Address,
    ) -> Result<(), Reason> {
        let request = MachineMessage::DeregisterListener {
            request_id: rand::random::<u32>(),
            kind,
            name: name.to_string(),
            listener,
        };
        Self::acked(self.query(request, ACK_ATTEMPTS).await?)
    }

    /// Look `name` up, making up to `retries` attempts (at least one) spaced
    /// by the retry delay while nothing is registered yet.
    pub async fn find(&self, name: &str, index: i32, retries: u32) -> Result<Address, Reason> {
        let attempts = retries.max(1);
        let mut last = Reason::NonexistentEntry;
        for attempt in 1..=attempts {
            let request = MachineMessage::Find {
                request_id: rand::random::<u32>(),
                name: name.to_string(),
                index,
            };
            match self.query(request, 1).await {
                Ok(MachineMessage::Found { addr, .. }) if !addr.is_none() => return Ok(addr),
                Ok(_) => last = Reason::NonexistentEntry,
                Err(reason) => last = reason,
            }
            tracing::debug!(
                "[machine] [find_miss] component={} index={} attempt={}/{} reason={}",
                name,
                index,
                attempt,
                attempts,
                last
            );
            if attempt < attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(last)
    }

    /// Send `request` and wait for the reply carrying the same request id.
    /// Each attempt waits up to the query timeout; other datagrams are
    /// discarded.
    pub async fn query(&self, request: MachineMessage, attempts: u32) -> Result<MachineMessage, Reason> {
        let bytes = request.encode().map_err(|_| Reason::CorruptedPacket)?;
        let request_id = request.request_id();
        let socket = self.socket.lock().await;
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        for attempt in 1..=attempts.max(1) {
            socket
                .send_to(&bytes, self.machined)
                .await
                .map_err(|e| Reason::from_io(&e))?;

            let wait = tokio::time::timeout(self.query_timeout, async {
                loop {
                    let (n, peer) = socket.recv_from(&mut buf).await?;
                    if peer != self.machined {
                        continue;
                    }
                    match MachineMessage::decode(Bytes::copy_from_slice(&buf[..n])) {
                        Ok(reply) if reply.request_id() == request_id => {
                            return Ok::<_, std::io::Error>(reply)
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!("[machine] [bad_reply] peer={} error={}", peer, e);
                        }
                    }
                }
            });
            match wait.await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => return Err(Reason::from_io(&e)),
                Err(_) => {
                    tracing::debug!("[machine] [query_timeout] request_id={} attempt={}", request_id, attempt);
                }
            }
        }
        Err(Reason::TimerExpired)
    }

    fn acked(reply: MachineMessage) -> Result<(), Reason> {
        match reply {
            MachineMessage::Ack { result, .. } => result,
            _ => Err(Reason::CorruptedPacket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::daemon::MachineDaemon;

    async fn spawn_daemon() -> SocketAddrV4 {
        let daemon = MachineDaemon::bind("127.0.0.1:0").await.unwrap();
        let addr = match daemon.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => panic!("expected v4"),
        };
        tokio::spawn(daemon.run());
        addr
    }

    async fn client_for(machined: SocketAddrV4) -> MachineClient {
        MachineClient::bind(machined, Duration::from_millis(200), Duration::from_millis(10))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_find() {
        let machined = spawn_daemon().await;
        let client = client_for(machined).await;
        let me = Address::from_host(0x7F00_0001, 32000).with_salt(11);

        client.register("baseappmgr", 0, me).await.unwrap();
        assert_eq!(client.find("baseappmgr", -1, 1).await, Ok(me));
        assert_eq!(client.find("baseappmgr", 0, 1).await, Ok(me));

        client.deregister("baseappmgr", 0, me).await.unwrap();
        assert_eq!(
            client.find("baseappmgr", -1, 2).await,
            Err(Reason::NonexistentEntry)
        );
    }

    #[tokio::test]
    async fn test_deregister_unknown_is_refused() {
        let machined = spawn_daemon().await;
        let client = client_for(machined).await;
        let me = Address::from_host(0x7F00_0001, 32001);
        assert_eq!(
            client.deregister("ghost", 0, me).await,
            Err(Reason::NonexistentEntry)
        );
    }

    #[tokio::test]
    async fn test_no_daemon_times_out() {
        // bound but silent
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = match silent.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => panic!("expected v4"),
        };
        let client = MachineClient::bind(addr, Duration::from_millis(30), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(client.find("dbmgr", -1, 2).await, Err(Reason::TimerExpired));
    }
}
