//! Datagram sources
//!
//! The ingestion loop reads from a [`DatagramSource`]. [`UdpSource`] is the
//! production implementation over a tokio `UdpSocket`.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// Something that yields datagrams and can be re-opened after repeated failures
#[async_trait]
pub trait DatagramSource: Send {
    /// Receive one datagram into `buf`, returning its length and sender
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Address the source is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Replace the underlying socket with a fresh one on the same address
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address cannot be bound again.
    async fn rebind(&mut self) -> Result<()>;
}

/// UDP socket source
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpSource {
    /// Bind a UDP socket
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = bind_socket(addr).await?;
        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }
}

#[async_trait]
impl DatagramSource for UdpSource {
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn rebind(&mut self) -> Result<()> {
        // The old socket must be released before its port can be bound again
        let placeholder = bind_socket(SocketAddr::new(self.local_addr.ip(), 0)).await?;
        drop(std::mem::replace(&mut self.socket, placeholder));

        self.socket = bind_socket(self.local_addr).await?;
        Ok(())
    }
}

async fn bind_socket(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}
