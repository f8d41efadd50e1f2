use crate::game::{ClientGameState, MatchAssignment};
use log::{debug, error, info, warn};
use shared::{Direction, Message, MAX_MESSAGE_SIZE};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// How often the held direction is repeated so the server knows we are still here
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(250);

/// Match state shared between the network task and the render loop
pub type SharedState = Arc<Mutex<ClientGameState>>;

pub fn lock(state: &SharedState) -> MutexGuard<'_, ClientGameState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn encode(message: &Message) -> io::Result<Vec<u8>> {
    message
        .encode()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

pub async fn connect_coordinator(addr: &str) -> io::Result<TcpStream> {
    info!("Connecting to coordinator at {}", addr);
    let stream = TcpStream::connect(addr).await?;
    info!("Connected to coordinator from {}", stream.local_addr()?);
    Ok(stream)
}

/// Asks the coordinator for a match and waits until it assigns one
pub async fn search(stream: &mut TcpStream) -> io::Result<MatchAssignment> {
    stream.write_all(&encode(&Message::Search)?).await?;
    info!("Searching for a match");

    let mut buffer = [0u8; MAX_MESSAGE_SIZE];
    loop {
        let len = stream.read(&mut buffer).await?;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "coordinator closed the connection",
            ));
        }

        match Message::decode(&buffer[..len]) {
            Ok(Message::Match {
                host,
                port,
                token,
                player,
            }) => {
                info!(
                    "Matched as player {} on {}:{}",
                    player.number(),
                    host,
                    port
                );
                return Ok(MatchAssignment {
                    host,
                    port,
                    token,
                    player,
                });
            }
            Ok(other) => warn!("Invalid message type {} from coordinator", other.kind()),
            Err(e) => warn!("Invalid message from coordinator: {}", e),
        }
    }
}

async fn send(socket: &UdpSocket, message: &Message) {
    let result = match encode(message) {
        Ok(data) => socket.send(&data).await.map(|_| ()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        warn!("Failed to send {}: {}", message.kind(), e);
    }
}

/// Joins the assigned server and relays state and input until the match ends
///
/// Returns once the server reports the match finished or the direction
/// channel closes because the window went away.
pub async fn run_match(
    assignment: MatchAssignment,
    state: SharedState,
    mut directions: mpsc::UnboundedReceiver<Direction>,
) -> io::Result<()> {
    let server = lookup_host((assignment.host.as_str(), assignment.port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve", assignment.host),
            )
        })?;

    let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;

    let join = Message::Join {
        token: assignment.token.clone(),
    };
    send(&socket, &join).await;
    info!("Joining {} as player {}", server, assignment.player.number());

    let mut keepalive = interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut direction = Direction::Stop;
    let mut joined = false;
    let mut buffer = [0u8; MAX_MESSAGE_SIZE];

    loop {
        tokio::select! {
            result = socket.recv(&mut buffer) => match result {
                Ok(len) => match Message::decode(&buffer[..len]) {
                    Ok(Message::State(snapshot)) => {
                        if lock(&state).apply_state(snapshot) {
                            joined = true;
                        }
                    }
                    Ok(Message::Status { phase }) => {
                        debug!("Server reports {:?}", phase);
                        if phase == shared::Phase::Finished {
                            info!("Match finished");
                            lock(&state).finish();
                            return Ok(());
                        }
                    }
                    Ok(other) => warn!("Invalid message type {} from server", other.kind()),
                    Err(e) => warn!("Invalid message from server: {}", e),
                },
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!("Server {} not reachable yet: {}", server, e);
                }
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },

            changed = directions.recv() => {
                let Some(changed) = changed else {
                    debug!("Input closed, leaving match");
                    return Ok(());
                };
                direction = changed;
                send(&socket, &movement(&assignment, direction)).await;
            },

            _ = keepalive.tick() => {
                // Join until the first frame shows we are in, then the held direction.
                if joined {
                    send(&socket, &movement(&assignment, direction)).await;
                } else {
                    send(&socket, &join).await;
                }
            },
        }
    }
}

fn movement(assignment: &MatchAssignment, direction: Direction) -> Message {
    Message::Movement {
        token: assignment.token.clone(),
        direction,
    }
}

/// Full client session on an open coordinator connection
pub async fn play(
    mut stream: TcpStream,
    state: SharedState,
    directions: mpsc::UnboundedReceiver<Direction>,
) -> io::Result<()> {
    let assignment = search(&mut stream).await?;
    lock(&state).assign(assignment.clone());
    drop(stream);

    run_match(assignment, state, directions).await
}
