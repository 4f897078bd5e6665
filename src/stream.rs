//! A duplex byte pipe over one TCP connection.
//!
//! [`Stream`] knows nothing about the Kyoto Tycoon wire format; it only
//! guarantees `read_exact`/`write_all` semantics with an optional per-call
//! timeout. Framing lives in [`crate::codec`].

use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// One TCP connection to the server, split into a buffered read half and a
/// write half so a request's write and its response's read never contend
/// for the same lock.
pub struct Stream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Option<Duration>,
}

impl Stream {
    /// Open a new TCP connection to `(host, port)`.
    pub async fn connect(host: &str, port: u16, socket_timeout: Option<Duration>) -> Result<Self> {
        let connect_fut = TcpStream::connect((host, port));
        let tcp = match socket_timeout {
            Some(d) => timeout(d, connect_fut).await??,
            None => connect_fut.await?,
        };
        tcp.set_nodelay(true).ok();
        let (read_half, write_half) = tcp.into_split();
        debug!("opened connection to {}:{}", host, port);
        Ok(Stream {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: socket_timeout,
        })
    }

    /// Write the whole buffer as a single contiguous message.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self.timeout {
            Some(d) => timeout(d, self.writer.write_all(buf)).await??,
            None => self.writer.write_all(buf).await?,
        }
        Ok(())
    }

    /// Block until exactly `n` bytes have been read, or fail.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        match self.timeout {
            Some(d) => timeout(d, self.reader.read_exact(&mut buf)).await??,
            None => self.reader.read_exact(&mut buf).await?,
        };
        Ok(buf)
    }
}
