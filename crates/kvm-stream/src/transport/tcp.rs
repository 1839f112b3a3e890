//! [`NativeHandle`] over a `std::net::TcpStream`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use tracing::debug;

use super::NativeHandle;

/// A TCP socket in non-blocking mode.
///
/// `write_blocking` briefly switches the socket back to blocking mode to drain
/// a flush, which is the one place the stream contract allows blocking.
#[derive(Debug)]
pub struct TcpHandle {
    stream: TcpStream,
    peer: String,
}

impl TcpHandle {
    /// Takes ownership of a connected socket and switches it to non-blocking
    /// mode.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket mode cannot be changed.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        debug!(%peer, "tcp handle created");
        Ok(Self { stream, peer })
    }

    /// Connects to `addr` (blocking) and wraps the resulting socket.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `connect` or from [`TcpHandle::new`].
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        Self::new(TcpStream::connect(addr)?)
    }

    /// The wrapped socket.
    pub fn socket(&self) -> &TcpStream {
        &self.stream
    }
}

impl NativeHandle for TcpHandle {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn write_blocking(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.set_nonblocking(false)?;
        let result = self
            .stream
            .write_all(buf)
            .and_then(|()| self.stream.flush());
        self.stream.set_nonblocking(true)?;
        result
    }

    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        match self.stream.shutdown(how) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn peer_name(&self) -> String {
        self.peer.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback_pair() -> (TcpHandle, TcpHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = TcpHandle::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (client, TcpHandle::new(server).expect("wrap"))
    }

    #[test]
    fn test_read_on_idle_socket_would_block() {
        let (_client, mut server) = loopback_pair();
        let mut buf = [0u8; 8];
        let err = server.try_read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_blocking_write_arrives_at_peer() {
        // Arrange
        let (mut client, mut server) = loopback_pair();

        // Act
        client.write_blocking(b"hello").expect("write");

        // Assert – poll until the bytes show up (loopback is fast but async).
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut buf = [0u8; 8];
        loop {
            match server.try_read(&mut buf) {
                Ok(n) => {
                    assert_eq!(&buf[..n], b"hello");
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("unexpected read error: {e}"),
            }
        }
    }

    #[test]
    fn test_peer_name_is_socket_address() {
        let (client, _server) = loopback_pair();
        assert!(client.peer_name().starts_with("127.0.0.1:"));
    }
}
