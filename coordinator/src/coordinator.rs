//! Fleet health polling and matchmaking
//!
//! The coordinator owns three pieces of state behind one lock: the fleet table,
//! the search queue and the registry of connected clients. The health-check
//! task writes server statuses, connection tasks push and remove clients, and
//! a matchmaking cycle reads both. The lock is held for the whole of a cycle,
//! including the Prepare round trip, so two cycles can never claim the same
//! server and the queue cannot shrink while a server is being prepared.
//!
//! The cost is that a slow server stalls the whole coordinator for up to one
//! query timeout: connects, disconnects and searches that arrive during a
//! Prepare wait for the lock and are applied once the cycle ends. Keep the
//! query timeout short relative to the health-check period.

use crate::fleet::{Fleet, ServerAddress, ServerStatus};
use crate::link::ServerLink;
use crate::queue::{ClientId, SearchQueue};
use log::{debug, info, warn};
use shared::{Message, Phase, PlayerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

/// Outgoing side of a client's control connection
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub addr: SocketAddr,
    pub sender: mpsc::UnboundedSender<Message>,
}

/// Two clients sent to the same server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub server: ServerAddress,
    pub player_1: ClientId,
    pub player_2: ClientId,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    fleet: Fleet,
    queue: SearchQueue,
    clients: HashMap<ClientId, ClientHandle>,
    next_client_id: ClientId,
}

pub struct Coordinator<L> {
    state: Mutex<CoordinatorState>,
    link: L,
    secret: String,
}

impl<L: ServerLink> Coordinator<L> {
    pub fn new(addresses: Vec<ServerAddress>, secret: String, link: L) -> Self {
        let fleet = Fleet::new(addresses);
        if fleet.is_empty() {
            warn!("No simulation servers configured - players will never be matched");
        }

        Self {
            state: Mutex::new(CoordinatorState {
                fleet,
                queue: SearchQueue::new(),
                clients: HashMap::new(),
                next_client_id: 1,
            }),
            link,
            secret,
        }
    }

    /// Starts tracking a new control connection
    pub async fn register_client(
        &self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    ) -> ClientId {
        let mut state = self.state.lock().await;
        let client_id = state.next_client_id;
        state.next_client_id = state.next_client_id.wrapping_add(1);
        state.clients.insert(client_id, ClientHandle { addr, sender });

        info!("Client {} connected from {}", client_id, addr);
        client_id
    }

    /// Forgets a connection and drops it from the search queue
    pub async fn remove_client(&self, client_id: ClientId) {
        let mut state = self.state.lock().await;
        let was_searching = state.queue.remove(client_id);

        if let Some(handle) = state.clients.remove(&client_id) {
            info!(
                "Client {} at {} disconnected{}",
                client_id,
                handle.addr,
                if was_searching { " while searching" } else { "" }
            );
        }
    }

    /// Queues a connected client. Returns true if the queue grew.
    pub async fn search(&self, client_id: ClientId) -> bool {
        let mut state = self.state.lock().await;

        let Some(addr) = state.clients.get(&client_id).map(|handle| handle.addr) else {
            warn!("Search from unknown client {}", client_id);
            return false;
        };

        if !state.queue.enqueue(client_id) {
            debug!("Client {} at {} is already searching", client_id, addr);
            return false;
        }

        info!(
            "Added client {} at {} as a searching player ({} waiting)",
            client_id,
            addr,
            state.queue.len()
        );
        true
    }

    pub async fn queued(&self) -> Vec<ClientId> {
        self.state.lock().await.queue.iter().copied().collect()
    }

    pub async fn server_status(&self, address: &ServerAddress) -> Option<ServerStatus> {
        self.state.lock().await.fleet.status(address)
    }

    pub async fn set_server_status(&self, address: &ServerAddress, status: ServerStatus) -> bool {
        self.state.lock().await.fleet.update(address, status)
    }

    /// Queries every server once, in configured order, and records what it reports
    pub async fn check_fleet(&self) {
        let addresses = self.state.lock().await.fleet.addresses();

        for address in addresses {
            let status = match self.link.request(&address, &Message::Query).await {
                Ok(Message::Status { phase }) => {
                    if phase == Phase::Waiting {
                        info!("Server {} is available", address);
                    } else {
                        info!("Server {} is busy ({:?})", address, phase);
                    }
                    ServerStatus::Reported(phase)
                }
                Ok(other) => {
                    warn!(
                        "Invalid message type {} from server {}",
                        other.kind(),
                        address
                    );
                    ServerStatus::Unresponsive
                }
                Err(e) => {
                    info!("Server {} is unresponsive: {}", address, e);
                    ServerStatus::Unresponsive
                }
            };

            self.state.lock().await.fleet.update(&address, status);
        }

        let state = self.state.lock().await;
        info!(
            "{} of {} servers available, {} clients searching",
            state.fleet.waiting_count(),
            state.fleet.len(),
            state.queue.len()
        );
    }

    /// Pairs the two longest-waiting clients with the first idle server
    pub async fn matchmake(&self) -> Option<Assignment> {
        let mut state = self.state.lock().await;

        if state.queue.len() < 2 {
            if !state.queue.is_empty() {
                debug!("One client searching, waiting for an opponent");
            }
            return None;
        }

        let Some(server) = state.fleet.first_waiting().cloned() else {
            debug!(
                "{} clients searching but no server is available",
                state.queue.len()
            );
            return None;
        };

        let prepare = Message::Prepare {
            secret: self.secret.clone(),
        };
        let (token_1, token_2) = match self.link.request(&server, &prepare).await {
            Ok(Message::Tokens { token_1, token_2 }) => (token_1, token_2),
            Ok(Message::Status { phase }) => {
                info!("Server {} is no longer available ({:?})", server, phase);
                state.fleet.update(&server, ServerStatus::Reported(phase));
                return None;
            }
            Ok(other) => {
                warn!(
                    "Server {} answered preparation with {}",
                    server,
                    other.kind()
                );
                return None;
            }
            Err(e) => {
                info!("Server {} did not prepare: {}", server, e);
                state.fleet.update(&server, ServerStatus::Unresponsive);
                return None;
            }
        };

        // Claimed: keep it out of the next cycle even before the next poll.
        state.fleet.update(&server, ServerStatus::Reported(Phase::Started));

        let (player_1, player_2) = state.queue.pop_pair()?;
        for (client_id, token, player) in [
            (player_1, token_1, PlayerId::Player1),
            (player_2, token_2, PlayerId::Player2),
        ] {
            let assignment = Message::Match {
                host: server.host.clone(),
                port: server.port,
                token: token.clone(),
                player,
            };

            match state.clients.get(&client_id) {
                Some(handle) if handle.sender.send(assignment).is_ok() => {
                    info!(
                        "Forwarded match on {} to client {} at {} with token {}",
                        server, client_id, handle.addr, token
                    );
                }
                _ => warn!(
                    "Client {} left before its match on {} could be forwarded",
                    client_id, server
                ),
            }
        }

        Some(Assignment {
            server,
            player_1,
            player_2,
        })
    }

    /// Polls the fleet and runs matchmaking on a fixed period, forever
    pub async fn run_health_checks(self: Arc<Self>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.check_fleet().await;

            while let Some(assignment) = self.matchmake().await {
                debug!("Health cycle produced {:?}", assignment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr};

    /// Plays the part of a fleet of simulation servers
    #[derive(Default)]
    struct MockLink {
        phases: std::sync::Mutex<HashMap<ServerAddress, Phase>>,
        prepares: std::sync::Mutex<Vec<(ServerAddress, String)>>,
        prepare_delay: Option<Duration>,
    }

    impl MockLink {
        fn with_servers(servers: &[(ServerAddress, Phase)]) -> Self {
            let link = MockLink::default();
            link.phases.lock().unwrap().extend(servers.iter().cloned());
            link
        }

        fn answer(&self, server: &ServerAddress, message: &Message) -> io::Result<Message> {
            let mut phases = self.phases.lock().unwrap();
            let Some(phase) = phases.get_mut(server) else {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            };

            match message {
                Message::Query => Ok(Message::Status { phase: *phase }),
                Message::Prepare { secret } if *phase == Phase::Waiting => {
                    *phase = Phase::Preparing;
                    self.prepares
                        .lock()
                        .unwrap()
                        .push((server.clone(), secret.clone()));
                    Ok(Message::Tokens {
                        token_1: format!("{}-one", server.port),
                        token_2: format!("{}-two", server.port),
                    })
                }
                _ => Err(io::Error::new(io::ErrorKind::TimedOut, "no reply")),
            }
        }
    }

    impl ServerLink for MockLink {
        async fn request(&self, server: &ServerAddress, message: &Message) -> io::Result<Message> {
            let reply = self.answer(server, message);
            if let (Message::Prepare { .. }, Some(delay)) = (message, self.prepare_delay) {
                tokio::time::sleep(delay).await;
            }
            reply
        }
    }

    fn server(port: u16) -> ServerAddress {
        ServerAddress::new("127.0.0.1", port)
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), port)
    }

    async fn searching_client(
        coordinator: &Coordinator<MockLink>,
        port: u16,
    ) -> (ClientId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = coordinator.register_client(peer(port), tx).await;
        assert!(coordinator.search(client_id).await);
        (client_id, rx)
    }

    #[tokio::test]
    async fn test_three_clients_one_server() {
        let link = MockLink::with_servers(&[(server(5000), Phase::Waiting)]);
        let coordinator = Coordinator::new(vec![server(5000)], "s3cret".to_string(), link);
        coordinator
            .set_server_status(&server(5000), ServerStatus::Reported(Phase::Waiting))
            .await;

        let (first, mut first_rx) = searching_client(&coordinator, 1).await;
        let (second, mut second_rx) = searching_client(&coordinator, 2).await;
        let (third, mut third_rx) = searching_client(&coordinator, 3).await;

        let assignment = coordinator.matchmake().await.unwrap();
        assert_eq!(
            assignment,
            Assignment {
                server: server(5000),
                player_1: first,
                player_2: second,
            }
        );

        assert_eq!(
            first_rx.try_recv().unwrap(),
            Message::Match {
                host: "127.0.0.1".to_string(),
                port: 5000,
                token: "5000-one".to_string(),
                player: PlayerId::Player1,
            }
        );
        assert_eq!(
            second_rx.try_recv().unwrap(),
            Message::Match {
                host: "127.0.0.1".to_string(),
                port: 5000,
                token: "5000-two".to_string(),
                player: PlayerId::Player2,
            }
        );
        assert!(third_rx.try_recv().is_err());

        assert_eq!(coordinator.queued().await, vec![third]);
        assert_ne!(
            coordinator.server_status(&server(5000)).await,
            Some(ServerStatus::Reported(Phase::Waiting))
        );
        assert_eq!(
            coordinator.link.prepares.lock().unwrap().as_slice(),
            &[(server(5000), "s3cret".to_string())]
        );

        // No second idle server, so the third client keeps waiting.
        assert!(coordinator.matchmake().await.is_none());
        assert_eq!(coordinator.queued().await, vec![third]);
    }

    #[tokio::test]
    async fn test_single_client_is_not_matched() {
        let link = MockLink::with_servers(&[(server(5000), Phase::Waiting)]);
        let coordinator = Coordinator::new(vec![server(5000)], String::new(), link);
        coordinator.check_fleet().await;

        let (client, _rx) = searching_client(&coordinator, 1).await;
        assert!(coordinator.matchmake().await.is_none());
        assert_eq!(coordinator.queued().await, vec![client]);
        assert!(coordinator.link.prepares.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_waiting_server_in_configured_order() {
        let fleet = vec![server(5000), server(5001), server(5002)];
        let link = MockLink::with_servers(&[
            (server(5000), Phase::Started),
            (server(5001), Phase::Waiting),
            (server(5002), Phase::Waiting),
        ]);
        let coordinator = Coordinator::new(fleet, String::new(), link);
        coordinator.check_fleet().await;

        searching_client(&coordinator, 1).await;
        searching_client(&coordinator, 2).await;
        searching_client(&coordinator, 3).await;
        searching_client(&coordinator, 4).await;

        assert_eq!(coordinator.matchmake().await.unwrap().server, server(5001));
        assert_eq!(coordinator.matchmake().await.unwrap().server, server(5002));
        assert!(coordinator.queued().await.is_empty());
    }

    #[tokio::test]
    async fn test_check_fleet_records_phases() {
        let fleet = vec![server(5000), server(5001), server(5002)];
        let link = MockLink::with_servers(&[
            (server(5000), Phase::Waiting),
            (server(5001), Phase::Preparing),
        ]);
        let coordinator = Coordinator::new(fleet, String::new(), link);

        coordinator.check_fleet().await;

        assert_eq!(
            coordinator.server_status(&server(5000)).await,
            Some(ServerStatus::Reported(Phase::Waiting))
        );
        assert_eq!(
            coordinator.server_status(&server(5001)).await,
            Some(ServerStatus::Reported(Phase::Preparing))
        );
        assert_eq!(
            coordinator.server_status(&server(5002)).await,
            Some(ServerStatus::Unresponsive)
        );
    }

    #[tokio::test]
    async fn test_failed_prepare_aborts_cycle() {
        // The table still believes the server is idle, but it has moved on.
        let link = MockLink::with_servers(&[(server(5000), Phase::Started)]);
        let coordinator = Coordinator::new(vec![server(5000)], String::new(), link);
        coordinator
            .set_server_status(&server(5000), ServerStatus::Reported(Phase::Waiting))
            .await;

        let (first, mut first_rx) = searching_client(&coordinator, 1).await;
        let (second, _) = searching_client(&coordinator, 2).await;

        assert!(coordinator.matchmake().await.is_none());
        assert_eq!(coordinator.queued().await, vec![first, second]);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(
            coordinator.server_status(&server(5000)).await,
            Some(ServerStatus::Unresponsive)
        );
    }

    #[tokio::test]
    async fn test_disconnect_leaves_queue() {
        let coordinator = Coordinator::new(vec![], String::new(), MockLink::default());

        let (first, _) = searching_client(&coordinator, 1).await;
        let (second, _) = searching_client(&coordinator, 2).await;
        coordinator.remove_client(first).await;

        assert_eq!(coordinator.queued().await, vec![second]);
        assert!(!coordinator.search(first).await);
    }

    #[test]
    fn test_repeated_search_queues_once() {
        tokio_test::block_on(async {
            let coordinator = Coordinator::new(vec![], String::new(), MockLink::default());
            let (client, _rx) = searching_client(&coordinator, 1).await;

            assert!(!coordinator.search(client).await);
            assert_eq!(coordinator.queued().await, vec![client]);
        });
    }

    #[tokio::test]
    async fn test_matched_client_that_left_is_skipped() {
        let link = MockLink::with_servers(&[(server(5000), Phase::Waiting)]);
        let coordinator = Coordinator::new(vec![server(5000)], String::new(), link);
        coordinator.check_fleet().await;

        let (_, first_rx) = searching_client(&coordinator, 1).await;
        let (_, mut second_rx) = searching_client(&coordinator, 2).await;
        drop(first_rx);

        assert!(coordinator.matchmake().await.is_some());
        assert!(matches!(
            second_rx.try_recv(),
            Ok(Message::Match {
                player: PlayerId::Player2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_search_during_slow_prepare_waits_for_cycle() {
        let link = MockLink {
            prepare_delay: Some(Duration::from_millis(200)),
            ..MockLink::with_servers(&[(server(5000), Phase::Waiting)])
        };
        let coordinator = Arc::new(Coordinator::new(vec![server(5000)], String::new(), link));
        coordinator.check_fleet().await;

        let (first, _first_rx) = searching_client(&coordinator, 1).await;
        let (second, _second_rx) = searching_client(&coordinator, 2).await;
        let (tx, _third_rx) = mpsc::unbounded_channel();
        let third = coordinator.register_client(peer(3), tx).await;

        let cycle = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.matchmake().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The cycle still holds the lock, so this search lands after the pair is popped.
        let started = std::time::Instant::now();
        assert!(coordinator.search(third).await);
        assert!(started.elapsed() >= Duration::from_millis(100));

        let assignment = cycle.await.unwrap().unwrap();
        assert_eq!((assignment.player_1, assignment.player_2), (first, second));
        assert_eq!(coordinator.queued().await, vec![third]);
    }
}
