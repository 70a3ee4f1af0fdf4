use super::protocol::CommandResponse;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// Write half of an accepted worker connection, carried alongside its command.
#[derive(Debug)]
pub struct ReplyStream {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl ReplyStream {
    pub(crate) fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self { stream, peer }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Write one response, then close our write half so the worker sees the end of it.
    ///
    /// Returns the number of bytes written.
    pub fn send(mut self, response: &CommandResponse) -> io::Result<usize> {
        let json = response.to_json();
        self.stream.write_all(json.as_bytes())?;
        self.stream.flush()?;
        let _ = self.stream.shutdown(Shutdown::Write);
        Ok(json.len())
    }
}
