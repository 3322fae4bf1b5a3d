//! Message Channel
//!
//! Ordered, framed message exchange over one TCP connection.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{MarinaError, Result};
use crate::protocol::{read_message, write_message, WireMessage};

/// Map codec errors so that a vanished peer is reported as `Disconnected`
fn classify(err: MarinaError) -> MarinaError {
    match err {
        MarinaError::Io(e) => MarinaError::classify_io(e),
        other => other,
    }
}

/// Duplex message channel over a TCP stream
///
/// Each `send`/`receive` moves exactly one complete frame.
pub struct MessageChannel {
    reader: ChannelReader,
    writer: ChannelWriter,
}

impl MessageChannel {
    /// Wrap an established stream
    ///
    /// Sets up buffered I/O on two handles of the same socket
    pub fn new(stream: TcpStream) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: ChannelReader {
                reader: BufReader::new(read_stream),
                peer_addr: peer_addr.clone(),
            },
            writer: ChannelWriter {
                writer: BufWriter::new(stream),
                peer_addr,
            },
        })
    }

    /// Connect to the first reachable address
    pub fn connect(addrs: &[SocketAddr], timeout: Option<Duration>) -> Result<Self> {
        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::new(stream),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => MarinaError::Io(e),
            None => MarinaError::Config("no address to connect to".to_string()),
        })
    }

    /// Send one message
    pub fn send<M: WireMessage>(&mut self, message: &M) -> Result<()> {
        self.writer.send(message)
    }

    /// Block until one message arrives
    pub fn receive<M: WireMessage>(&mut self) -> Result<M> {
        self.reader.receive()
    }

    /// Split into independently owned halves
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }

    pub fn peer_addr(&self) -> &str {
        &self.reader.peer_addr
    }

    /// Close both directions; pending reads on the peer see EOF
    pub fn close(&self) {
        self.writer.close();
    }
}

/// Receiving half of a [`MessageChannel`]
pub struct ChannelReader {
    reader: BufReader<TcpStream>,
    peer_addr: String,
}

impl ChannelReader {
    pub fn receive<M: WireMessage>(&mut self) -> Result<M> {
        read_message(&mut self.reader).map_err(classify)
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Sending half of a [`MessageChannel`]
pub struct ChannelWriter {
    writer: BufWriter<TcpStream>,
    peer_addr: String,
}

impl ChannelWriter {
    pub fn send<M: WireMessage>(&mut self, message: &M) -> Result<()> {
        write_message(&mut self.writer, message).map_err(classify)
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Shut the socket down in both directions
    pub fn close(&self) {
        if let Err(e) = self.writer.get_ref().shutdown(Shutdown::Both) {
            // Already closed by the peer is the common case here
            tracing::trace!("Shutdown of {} failed: {}", self.peer_addr, e);
        }
    }
}
