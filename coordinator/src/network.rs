//! TCP control channel between players and the coordinator

use crate::coordinator::Coordinator;
use crate::link::ServerLink;
use crate::queue::ClientId;
use log::{debug, error, info, warn};
use shared::{Message, MAX_MESSAGE_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Accepts control connections until the listener fails for good
pub async fn serve<L: ServerLink>(coordinator: Arc<Coordinator<L>>, listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        info!("Accepting player connections on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    handle_connection(coordinator, stream, addr).await;
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Spawns task that writes queued messages to one client
fn spawn_writer(
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    addr: SocketAddr,
) {
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let data = match message.encode() {
                Ok(data) => data,
                Err(e) => {
                    error!("Dropping {} for {}: {}", message.kind(), addr, e);
                    continue;
                }
            };

            if let Err(e) = writer.write_all(&data).await {
                warn!("Failed to send {} to {}: {}", message.kind(), addr, e);
                break;
            }
        }

        let _ = writer.shutdown().await;
    });
}

/// Reads records from one client until it leaves or sends garbage
async fn handle_connection<L: ServerLink>(
    coordinator: Arc<Coordinator<L>>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    let (mut reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    spawn_writer(writer, outbound_rx, addr);

    let client_id = coordinator.register_client(addr, outbound_tx).await;
    let mut buffer = [0u8; MAX_MESSAGE_SIZE];

    loop {
        let len = match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!("Client {} at {} closed the connection", client_id, addr);
                break;
            }
            Ok(len) => len,
            Err(e) => {
                warn!("Connection error from {}: {}", addr, e);
                break;
            }
        };

        match Message::decode(&buffer[..len]) {
            Ok(Message::Search) => {
                if coordinator.search(client_id).await {
                    coordinator.matchmake().await;
                }
            }
            Ok(other) => {
                warn!("Invalid message type {} from {}", other.kind(), addr);
            }
            Err(e) => {
                warn!("Closing connection to {}: {}", addr, e);
                break;
            }
        }
    }

    disconnect(&coordinator, client_id).await;
}

async fn disconnect<L: ServerLink>(coordinator: &Coordinator<L>, client_id: ClientId) {
    // Dropping the registry entry closes the writer channel, which shuts the socket.
    coordinator.remove_client(client_id).await;
}
