//! Blocking TCP transport.
//!
//! A [`Connection`] owns one socket to a single node and offers the two
//! primitives the session layer needs: full-buffer send and exact-count
//! receive. All calls block; there are no read or connect timeouts and no
//! cancellation. The socket is shut down exactly once, on [`close`]
//! (idempotent) or on drop, whichever comes first.
//!
//! [`close`]: Connection::close

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::{ClientError, Result};

/// A blocking TCP connection to a node's listening endpoint.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: String,
    closed: bool,
}

impl Connection {
    /// Establish a blocking TCP connection to `host:port`.
    pub fn open(host: &str, port: u16) -> Result<Self> {
        let peer = format!("{host}:{port}");
        tracing::info!("opening TCP connection to {peer}");
        let stream = TcpStream::connect((host, port)).map_err(|source| ClientError::Connect {
            addr: peer.clone(),
            source,
        })?;
        Ok(Self {
            stream,
            peer,
            closed: false,
        })
    }

    /// The `host:port` this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write the full buffer to the socket.
    ///
    /// A partial write or broken pipe surfaces as [`ClientError::Io`];
    /// nothing is ever silently truncated.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        tracing::trace!("sending {} bytes to {}", bytes.len(), self.peer);
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Block until exactly `n` bytes arrive.
    ///
    /// Returns an empty buffer when the peer closes the connection before
    /// the first byte, signalling an orderly closure to the caller. A
    /// close after some but not all bytes is an [`ClientError::Io`]
    /// failure: the stream can no longer be demarcated into messages.
    pub fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match self.stream.read(&mut buf[filled..])? {
                0 if filled == 0 => return Ok(Vec::new()),
                0 => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("peer closed after {filled} of {n} bytes"),
                    )
                    .into())
                }
                count => filled += count,
            }
        }
        Ok(buf)
    }

    /// Shut the socket down. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::info!("closing connection to {}", self.peer);
            // The process is done with the socket either way.
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_open_unreachable_is_connect_error() {
        // A port nothing listens on: bind then drop to reserve-and-release.
        let (listener, port) = listener();
        drop(listener);
        let err = Connection::open("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[test]
    fn test_send_and_recv_exact() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"hello");
            stream.write_all(b"worlds").unwrap();
        });

        let mut conn = Connection::open("127.0.0.1", port).unwrap();
        conn.send(b"hello").unwrap();
        assert_eq!(conn.recv_exact(6).unwrap(), b"worlds");
        server.join().unwrap();
    }

    #[test]
    fn test_recv_exact_empty_on_orderly_close() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut conn = Connection::open("127.0.0.1", port).unwrap();
        server.join().unwrap();
        assert!(conn.recv_exact(8).unwrap().is_empty());
    }

    #[test]
    fn test_recv_exact_fails_mid_read() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[1, 2, 3]).unwrap();
        });

        let mut conn = Connection::open("127.0.0.1", port).unwrap();
        server.join().unwrap();
        let err = conn.recv_exact(8).unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let _ = listener.accept().unwrap();
        });
        let mut conn = Connection::open("127.0.0.1", port).unwrap();
        server.join().unwrap();
        conn.close();
        conn.close();
    }
}
