//! Request/response exchanges with simulation servers

use crate::fleet::ServerAddress;
use shared::{Message, MAX_MESSAGE_SIZE};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

/// Sends one message to a simulation server and waits for its single reply
pub trait ServerLink: Send + Sync + 'static {
    fn request(
        &self,
        server: &ServerAddress,
        message: &Message,
    ) -> impl Future<Output = io::Result<Message>> + Send;
}

/// One short-lived UDP socket per request, bounded by a reply timeout
#[derive(Debug, Clone)]
pub struct UdpLink {
    reply_timeout: Duration,
}

impl UdpLink {
    pub fn new(reply_timeout: Duration) -> Self {
        Self { reply_timeout }
    }
}

impl ServerLink for UdpLink {
    async fn request(&self, server: &ServerAddress, message: &Message) -> io::Result<Message> {
        let target = lookup_host((server.host.as_str(), server.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", server))
            })?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;

        let data = message
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        socket.send(&data).await?;

        let mut buffer = [0u8; MAX_MESSAGE_SIZE];
        let len = timeout(self.reply_timeout, socket.recv(&mut buffer))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no reply before timeout"))??;

        Message::decode(&buffer[..len]).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
