//! Server network layer handling UDP communications and the match loop

use crate::session::{JoinOutcome, Session, SessionConfig};
use log::{debug, error, info, warn};
use shared::{Message, Phase, MAX_MESSAGE_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Wall-clock spacing of the periodic score line in the debug log
const SCORE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// A decoded datagram handed from the receiver task to the main loop
#[derive(Debug)]
pub struct Inbound {
    pub message: Message,
    pub addr: SocketAddr,
}

/// A message queued for the sender task
#[derive(Debug)]
pub struct Outbound {
    pub message: Message,
    pub addr: SocketAddr,
}

/// Simulation server owning one match
///
/// All session state lives on the task that runs [`Server::run`]. The receiver
/// and sender tasks only move bytes, so movement updates and physics ticks are
/// applied strictly one after the other.
pub struct Server {
    socket: Arc<UdpSocket>,
    session: Session,
    tick_duration: Duration,
    score_log_frames: u64,

    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: SessionConfig,
        tick_duration: Duration,
    ) -> io::Result<Self> {
        Self::with_session(addr, Session::new(config), tick_duration).await
    }

    pub async fn with_session(
        addr: &str,
        session: Session,
        tick_duration: Duration,
    ) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Started listening on {}", socket.local_addr()?);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            session,
            tick_duration,
            score_log_frames: frames_per(SCORE_LOG_INTERVAL, tick_duration),
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let inbound_tx = self.inbound_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_MESSAGE_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Message::decode(&buffer[..len]) {
                        Ok(message) => {
                            if inbound_tx.send(Inbound { message, addr }).is_err() {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid message from {}: {}", addr, e),
                    },
                    Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                        debug!("Connection reset by peer - likely a client disconnected: {}", e);
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing queue onto the socket
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(Outbound { message, addr }) = outbound_rx.recv().await {
                let data = match message.encode() {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Dropping {} for {}: {}", message.kind(), addr, e);
                        continue;
                    }
                };

                if let Err(e) = socket.send_to(&data, addr).await {
                    warn!("Failed to send {} to {}: {}", message.kind(), addr, e);
                }
            }
        });
    }

    fn send_message(&self, message: Message, addr: SocketAddr) {
        debug!("Sending {} to {}", message.kind(), addr);
        if let Err(e) = self.outbound_tx.send(Outbound { message, addr }) {
            error!("Failed to queue message for sending: {}", e);
        }
    }

    /// Dispatches one request against the session
    fn handle_message(&mut self, message: Message, addr: SocketAddr) {
        match message {
            Message::Query => {
                info!("Received status query from {}", addr);
                let phase = self.session.phase();
                self.send_message(Message::Status { phase }, addr);
            }

            Message::Prepare { secret } => {
                if let Some(tokens) = self.session.prepare(&secret, addr) {
                    self.send_message(
                        Message::Tokens {
                            token_1: tokens.token_1,
                            token_2: tokens.token_2,
                        },
                        addr,
                    );
                }
            }

            Message::Join { token } => {
                if let JoinOutcome::Started(_) = self.session.join(&token, addr, Instant::now()) {
                    info!(
                        "Physics loop running at {:.0} Hz",
                        1.0 / self.tick_duration.as_secs_f64()
                    );
                }
            }

            Message::Movement { token, direction } => {
                self.session.movement(&token, direction, Instant::now());
            }

            other => {
                warn!("Invalid message type {} from {}", other.kind(), addr);
            }
        }
    }

    fn tick(&mut self) {
        for (addr, message) in self.session.tick(Instant::now()) {
            self.send_message(message, addr);
        }

        let frame = self.session.game().frame;
        if frame % self.score_log_frames == 0 {
            let players = &self.session.game().players;
            debug!(
                "Frame {}: score [{} - {}]",
                frame, players[0].score, players[1].score
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> io::Result<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully in phase {:?}", self.phase());

        loop {
            let started = self.session.phase() == Phase::Started;

            tokio::select! {
                inbound = self.inbound_rx.recv() => {
                    let Some(Inbound { message, addr }) = inbound else {
                        info!("Server shutting down");
                        break;
                    };

                    self.handle_message(message, addr);
                    if !started && self.session.phase() == Phase::Started {
                        tick_interval.reset();
                    }
                },

                _ = tick_interval.tick(), if started => {
                    self.tick();
                },
            }
        }

        Ok(())
    }
}

/// Number of ticks that fit in `span`, never less than one
fn frames_per(span: Duration, tick_duration: Duration) -> u64 {
    if tick_duration.is_zero() {
        return 1;
    }
    ((span.as_secs_f64() / tick_duration.as_secs_f64()).round() as u64).max(1)
}
