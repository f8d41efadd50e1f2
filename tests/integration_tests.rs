//! Integration tests for the coordinator, simulation server and client
//!
//! Everything here runs over real loopback sockets.

use client::game::{ClientGameState, ClientStatus, MatchAssignment};
use client::network::{connect_coordinator, lock, run_match, search, SharedState};
use coordinator::coordinator::Coordinator;
use coordinator::fleet::{ServerAddress, ServerStatus};
use coordinator::link::{ServerLink, UdpLink};
use coordinator::network::serve;
use server::network::Server;
use server::session::SessionConfig;
use shared::{Direction, Message, Phase, PlayerId, MAX_MESSAGE_SIZE};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const SECRET: &str = "s3cret";

async fn spawn_server(config: SessionConfig) -> u16 {
    let mut server = Server::new("127.0.0.1:0", config, Duration::from_millis(8))
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    port
}

fn authenticated() -> SessionConfig {
    SessionConfig {
        secret: Some(SECRET.to_string()),
        ..Default::default()
    }
}

async fn spawn_coordinator(
    fleet: Vec<ServerAddress>,
    secret: &str,
    query_timeout: Duration,
) -> (Arc<Coordinator<UdpLink>>, SocketAddr) {
    let coordinator = Arc::new(Coordinator::new(
        fleet,
        secret.to_string(),
        UdpLink::new(query_timeout),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(serve(Arc::clone(&coordinator), listener));
    (coordinator, addr)
}

/// Port that nothing listens on
async fn dead_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.local_addr().unwrap().port()
}

async fn query(port: u16) -> Message {
    UdpLink::new(Duration::from_secs(1))
        .request(&ServerAddress::new("127.0.0.1", port), &Message::Query)
        .await
        .unwrap()
}

/// Connects a raw control stream and sends one Search
async fn send_search(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&Message::Search.encode().unwrap())
        .await
        .unwrap();
    stream
}

/// Runs the client's search on its own task
async fn spawn_search(addr: SocketAddr) -> JoinHandle<(TcpStream, MatchAssignment)> {
    let mut stream = connect_coordinator(&addr.to_string()).await.unwrap();
    tokio::spawn(async move {
        let assignment = search(&mut stream).await.unwrap();
        (stream, assignment)
    })
}

/// MATCHMAKING TESTS
mod matchmaking_tests {
    use super::*;

    /// Two players go from search to receiving frames from the same server
    #[tokio::test]
    async fn full_match_flow() {
        let dead = dead_port().await;
        let port = spawn_server(authenticated()).await;
        let fleet = vec![
            ServerAddress::new("127.0.0.1", dead),
            ServerAddress::new("127.0.0.1", port),
        ];
        let (coordinator, addr) =
            spawn_coordinator(fleet.clone(), SECRET, Duration::from_millis(300)).await;

        coordinator.check_fleet().await;
        assert_eq!(
            coordinator.server_status(&fleet[0]).await,
            Some(ServerStatus::Unresponsive)
        );
        assert_eq!(
            coordinator.server_status(&fleet[1]).await,
            Some(ServerStatus::Reported(Phase::Waiting))
        );

        // The first player is queued before the second connects, so it becomes player 1.
        let first = spawn_search(addr).await;
        while coordinator.queued().await.is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
        let second = spawn_search(addr).await;

        let mut assignments: Vec<MatchAssignment> = Vec::new();
        for task in [first, second] {
            let (_stream, assignment) = timeout(Duration::from_secs(3), task)
                .await
                .unwrap()
                .unwrap();
            assignments.push(assignment);
        }

        assert_eq!(assignments[0].player, PlayerId::Player1);
        assert_eq!(assignments[1].player, PlayerId::Player2);
        assert!(assignments.iter().all(|a| a.port == port));
        assert_ne!(assignments[0].token, assignments[1].token);
        assert!(coordinator.queued().await.is_empty());
        assert_ne!(
            coordinator.server_status(&fleet[1]).await,
            Some(ServerStatus::Reported(Phase::Waiting))
        );
        assert_eq!(
            query(port).await,
            Message::Status {
                phase: Phase::Preparing
            }
        );

        let mut players = Vec::new();
        for assignment in assignments {
            let state: SharedState = Arc::new(Mutex::new(ClientGameState::new()));
            lock(&state).assign(assignment.clone());
            let (direction_tx, direction_rx) = mpsc::unbounded_channel();
            let task = tokio::spawn(run_match(assignment, Arc::clone(&state), direction_rx));
            players.push((state, direction_tx, task));
        }

        timeout(Duration::from_secs(3), async {
            while players
                .iter()
                .any(|(state, _, _)| lock(state).last_frame().is_none())
            {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        for (state, _, _) in &players {
            assert_eq!(lock(state).status(), &ClientStatus::Playing);
        }

        players[0].1.send(Direction::Up).unwrap();
        timeout(Duration::from_secs(3), async {
            loop {
                let moving = lock(&players[1].0)
                    .latest()
                    .map(|snapshot| snapshot.player_1.paddle_direction == Direction::Up)
                    .unwrap_or(false);
                if moving {
                    break;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        coordinator.check_fleet().await;
        assert_eq!(
            coordinator.server_status(&fleet[1]).await,
            Some(ServerStatus::Reported(Phase::Started))
        );

        for (_, direction_tx, task) in players {
            drop(direction_tx);
            timeout(Duration::from_secs(1), task)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }

    /// A coordinator with the wrong secret never gets tokens
    #[tokio::test]
    async fn wrong_secret_leaves_queue_intact() {
        let port = spawn_server(authenticated()).await;
        let fleet = vec![ServerAddress::new("127.0.0.1", port)];
        let (coordinator, addr) =
            spawn_coordinator(fleet.clone(), "guess", Duration::from_millis(200)).await;
        coordinator.check_fleet().await;

        let _streams = [send_search(addr).await, send_search(addr).await];

        timeout(Duration::from_secs(3), async {
            while coordinator.server_status(&fleet[0]).await != Some(ServerStatus::Unresponsive) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(coordinator.queued().await.len(), 2);
        assert_eq!(
            query(port).await,
            Message::Status {
                phase: Phase::Waiting
            }
        );

        // The next health check finds it idle again and still refuses to prepare it.
        coordinator.check_fleet().await;
        assert!(coordinator.matchmake().await.is_none());
        assert_eq!(coordinator.queued().await.len(), 2);
    }

    /// A third player keeps waiting when the only server is taken
    #[tokio::test]
    async fn third_player_waits_for_a_free_server() {
        let port = spawn_server(authenticated()).await;
        let fleet = vec![ServerAddress::new("127.0.0.1", port)];
        let (coordinator, addr) =
            spawn_coordinator(fleet.clone(), SECRET, Duration::from_millis(300)).await;
        coordinator.check_fleet().await;

        let first = send_search(addr).await;
        while coordinator.queued().await.is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
        let second = send_search(addr).await;

        // The first two are matched as soon as the second search lands.
        timeout(Duration::from_secs(3), async {
            while coordinator.server_status(&fleet[0]).await
                == Some(ServerStatus::Reported(Phase::Waiting))
            {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(coordinator.queued().await.is_empty());

        let third = send_search(addr).await;
        timeout(Duration::from_secs(3), async {
            while coordinator.queued().await.len() != 1 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        coordinator.check_fleet().await;
        assert!(coordinator.matchmake().await.is_none());
        assert_eq!(coordinator.queued().await.len(), 1);
        drop((first, second, third));
    }
}

/// SIMULATION SERVER TESTS
mod server_tests {
    use super::*;

    async fn receive(socket: &UdpSocket) -> Option<Message> {
        let mut buffer = [0u8; MAX_MESSAGE_SIZE];
        match timeout(Duration::from_millis(500), socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => Message::decode(&buffer[..len]).ok(),
            _ => None,
        }
    }

    async fn prepared_server(config: SessionConfig) -> (u16, String, String) {
        let port = spawn_server(config).await;
        let link = UdpLink::new(Duration::from_secs(1));
        let prepare = Message::Prepare {
            secret: SECRET.to_string(),
        };
        match link
            .request(&ServerAddress::new("127.0.0.1", port), &prepare)
            .await
            .unwrap()
        {
            Message::Tokens { token_1, token_2 } => (port, token_1, token_2),
            other => panic!("Expected tokens, got {:?}", other),
        }
    }

    async fn joined(port: u16, token: &str) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(("127.0.0.1", port)).await.unwrap();
        let join = Message::Join {
            token: token.to_string(),
        };
        socket.send(&join.encode().unwrap()).await.unwrap();
        socket
    }

    /// Frames carry the recipient's token and never go backwards
    #[tokio::test]
    async fn state_frames_are_stamped_per_player() {
        let (port, token_1, token_2) = prepared_server(authenticated()).await;
        let player_1 = joined(port, &token_1).await;
        let player_2 = joined(port, &token_2).await;

        let mut last = 0;
        for _ in 0..20 {
            match receive(&player_1).await {
                Some(Message::State(snapshot)) => {
                    assert_eq!(snapshot.token, token_1);
                    assert!(snapshot.frame > last);
                    assert!((0.0..=1.0).contains(&snapshot.player_1.paddle_location));
                    last = snapshot.frame;
                }
                other => panic!("Expected state, got {:?}", other),
            }
        }

        match receive(&player_2).await {
            Some(Message::State(snapshot)) => assert_eq!(snapshot.token, token_2),
            other => panic!("Expected state, got {:?}", other),
        }
    }

    /// A stranger's token neither joins nor starts the match
    #[tokio::test]
    async fn unknown_token_cannot_join() {
        let (port, token_1, _) = prepared_server(authenticated()).await;
        let _player_1 = joined(port, &token_1).await;
        let stranger = joined(port, &"0".repeat(32)).await;

        assert_eq!(receive(&stranger).await, None);
        assert_eq!(
            query(port).await,
            Message::Status {
                phase: Phase::Preparing
            }
        );
    }

    /// Silent players end the match and both seats hear about it
    #[tokio::test]
    async fn idle_players_finish_match() {
        let (port, token_1, token_2) = prepared_server(SessionConfig {
            idle_timeout: Some(Duration::from_millis(300)),
            ..authenticated()
        })
        .await;
        let player_1 = joined(port, &token_1).await;
        let _player_2 = joined(port, &token_2).await;

        let finished = timeout(Duration::from_secs(3), async {
            loop {
                if let Some(Message::Status { phase }) = receive(&player_1).await {
                    break phase;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(finished, Phase::Finished);

        assert_eq!(
            query(port).await,
            Message::Status {
                phase: Phase::Finished
            }
        );
    }
}
