use std::{net::SocketAddr, sync::Arc};

use parking_lot::RwLock;
use tokio::{
    net::{lookup_host, UdpSocket},
    sync::Mutex,
};
use tracing::{debug, info};

use crate::{
    address::{Address, Protocol},
    error::{Error, Result},
};

/// Owns the outbound transport for one client.
///
/// The socket is opened lazily by [Reporter::connect]. Concurrent callers
/// share a single connect gate, so racing flushes wait for one connection
/// attempt instead of opening several. Once connected, sends are independent
/// fire-and-forget datagrams.
#[derive(Debug)]
pub struct Reporter {
    addr: Address,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    connecting: Mutex<()>,
    #[cfg(test)]
    opened: std::sync::atomic::AtomicUsize,
}

impl Reporter {
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            socket: RwLock::new(None),
            connecting: Mutex::new(()),
            #[cfg(test)]
            opened: Default::default(),
        }
    }
    pub fn address(&self) -> &Address {
        &self.addr
    }
    pub fn is_connected(&self) -> bool {
        self.socket.read().is_some()
    }

    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let _gate = self.connecting.lock().await;
        // Someone else may have connected while we waited on the gate.
        if self.is_connected() {
            return Ok(());
        }
        let socket = open(&self.addr).await?;
        #[cfg(test)]
        self.opened
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        info!(addr = %self.addr, local = ?socket.local_addr().ok(), "Connected to collector");
        *self.socket.write() = Some(Arc::new(socket));
        Ok(())
    }

    /// Sends every line, newline terminated, as a single datagram and returns
    /// the number of bytes written. An empty batch sends nothing.
    ///
    /// A failed send drops the socket so that the next flush reconnects.
    pub async fn send<I, S>(&self, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let socket = self.socket.read().clone().ok_or(Error::NotConnected)?;
        let mut line_count = 0usize;
        let payload = lines.into_iter().fold(String::new(), |mut payload, line| {
            payload.push_str(line.as_ref());
            payload.push('\n');
            line_count += 1;
            payload
        });
        if payload.is_empty() {
            return Ok(0);
        }
        match socket.send(payload.as_bytes()).await {
            Ok(sent) => {
                debug!(bytes = sent, lines = line_count, "Sent payload");
                Ok(sent)
            }
            Err(err) => {
                self.disconnect(&socket);
                Err(err.into())
            }
        }
    }

    /// Releases the socket. Closing twice, or closing before ever
    /// connecting, is a no-op.
    pub fn close(&self) {
        if self.socket.write().take().is_some() {
            info!(addr = %self.addr, "Closed connection to collector");
        }
    }

    fn disconnect(&self, failed: &Arc<UdpSocket>) {
        let mut socket = self.socket.write();
        // Leave a socket opened by a concurrent reconnect alone.
        if socket.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            *socket = None;
        }
    }
}

async fn open(addr: &Address) -> Result<UdpSocket> {
    if addr.protocol() != Protocol::Udp {
        return Err(Error::UnsupportedProtocol(addr.protocol()));
    }
    let remote = lookup_host(addr.authority())
        .await?
        .next()
        .ok_or_else(|| Error::BadAddress(addr.to_string()))?;
    let local: SocketAddr = if remote.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    async fn collector() -> (UdpSocket, Address) {
        let server = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake collector!");
        let port = server.local_addr().unwrap().port();
        (server, Address::new(Protocol::Udp, "127.0.0.1", port))
    }

    async fn receive(server: &UdpSocket) -> String {
        let mut buf = vec![0u8; 65_536];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut buf))
            .await
            .expect("Timed out waiting for a datagram")
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).to_string()
    }

    #[tokio::test]
    async fn test_send_one_datagram() {
        let (server, addr) = collector().await;
        let reporter = Reporter::new(addr);
        reporter.connect().await.unwrap();
        reporter.connect().await.unwrap();
        assert!(reporter.is_connected());
        let sent = reporter.send(["foo:1|c", "bar:2|g"]).await.unwrap();
        assert_eq!(sent, "foo:1|c\nbar:2|g\n".len());
        assert_eq!(receive(&server).await, "foo:1|c\nbar:2|g\n");
        assert_eq!(reporter.send(Vec::<String>::new()).await.unwrap(), 0);
    }

    fn opened(reporter: &Reporter) -> usize {
        reporter.opened.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn local_addr(reporter: &Reporter) -> Option<SocketAddr> {
        reporter
            .socket
            .read()
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_the_gate() {
        let (_server, addr) = collector().await;
        let reporter = Reporter::new(addr);
        let (a, b, c) = tokio::join!(reporter.connect(), reporter.connect(), reporter.connect());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert!(reporter.is_connected());
        assert_eq!(opened(&reporter), 1);
        let first = local_addr(&reporter);
        assert!(first.is_some());

        let (d, e) = tokio::join!(reporter.connect(), reporter.connect());
        assert!(d.is_ok() && e.is_ok());
        assert_eq!(opened(&reporter), 1);
        assert_eq!(local_addr(&reporter), first);

        // a closed reporter opens a fresh socket, once
        reporter.close();
        let (f, g) = tokio::join!(reporter.connect(), reporter.connect());
        assert!(f.is_ok() && g.is_ok());
        assert_eq!(opened(&reporter), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_server, addr) = collector().await;
        let reporter = Reporter::new(addr);
        reporter.close();
        assert!(matches!(
            reporter.send(["foo:1|c"]).await,
            Err(Error::NotConnected)
        ));
        reporter.connect().await.unwrap();
        reporter.close();
        reporter.close();
        assert!(!reporter.is_connected());
        assert!(matches!(
            reporter.send(["foo:1|c"]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unsupported_protocols() {
        for addr in ["tcp://127.0.0.1:8125", "unix:///tmp/dsd.socket"] {
            let reporter = Reporter::new(Address::parse(addr).unwrap());
            assert!(matches!(
                reporter.connect().await,
                Err(Error::UnsupportedProtocol(_))
            ));
            assert!(!reporter.is_connected());
        }
    }
}
