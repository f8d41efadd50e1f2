//! Match lifecycle for a single simulation server
//!
//! A server hosts exactly one match per process. The session walks through
//! `Waiting -> Preparing -> Started -> Finished` and never moves backwards:
//! - `Waiting`: nobody has been handed the token pair yet
//! - `Preparing`: the coordinator holds the tokens, players are joining
//! - `Started`: both players joined, the physics loop is running
//! - `Finished`: a player reached the score limit or went silent
//!
//! Every request that arrives in the wrong phase, with the wrong secret or with
//! an unknown token is dropped without a reply and without touching state.

use crate::game::GameState;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Direction, Message, Phase, PlayerId};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// The two secrets that admit Player 1 and Player 2 to this match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token_1: String,
    pub token_2: String,
}

impl TokenPair {
    /// Generates two distinct 32-character hex tokens
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token_1 = random_token(rng);
        let mut token_2 = random_token(rng);

        while token_2 == token_1 {
            token_2 = random_token(rng);
        }

        Self { token_1, token_2 }
    }

    pub fn player_for(&self, token: &str) -> Option<PlayerId> {
        if token == self.token_1 {
            Some(PlayerId::Player1)
        } else if token == self.token_2 {
            Some(PlayerId::Player2)
        } else {
            None
        }
    }

    pub fn token_for(&self, player_id: PlayerId) -> &str {
        match player_id {
            PlayerId::Player1 => &self.token_1,
            PlayerId::Player2 => &self.token_2,
        }
    }
}

fn random_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Tunables for a session, usually straight from the command line
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Shared secret a Prepare request must carry. `None` disables the check.
    pub secret: Option<String>,
    /// Score that ends the match. `None` plays forever.
    pub max_score: Option<u32>,
    /// Silence after which a joined player is considered gone. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

/// A joined player's return address and liveness
#[derive(Debug, Clone)]
pub struct Seat {
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Wrong phase, unknown token or token already claimed
    Rejected,
    /// Seat claimed, still waiting for the opponent
    Registered(PlayerId),
    /// Seat claimed and the match has started
    Started(PlayerId),
}

pub struct Session {
    config: SessionConfig,
    tokens: TokenPair,
    phase: Phase,
    seats: [Option<Seat>; 2],
    game: GameState,
    rng: StdRng,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: SessionConfig, mut rng: StdRng) -> Self {
        let tokens = TokenPair::generate(&mut rng);
        info!(
            "Generated tokens {} / {}",
            tokens.token_1, tokens.token_2
        );

        Self {
            config,
            tokens,
            phase: Phase::Waiting,
            seats: [None, None],
            game: GameState::new(),
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn seat(&self, player_id: PlayerId) -> Option<&Seat> {
        self.seats[player_id.index()].as_ref()
    }

    /// Hands out the token pair if the server is idle and the secret matches
    pub fn prepare(&mut self, secret: &str, addr: SocketAddr) -> Option<TokenPair> {
        info!("Received preparation request from {}", addr);

        if self.phase != Phase::Waiting {
            debug!("Ignoring preparation request in phase {:?}", self.phase);
            return None;
        }

        match &self.config.secret {
            None => warn!("No secret set - skipping authentication with {}", addr),
            Some(expected) if expected != secret => {
                warn!("Rejected preparation request from {}: secret mismatch", addr);
                return None;
            }
            Some(_) => {}
        }

        info!("Forwarding tokens after transitioning into a prepared state");
        self.phase = Phase::Preparing;
        Some(self.tokens.clone())
    }

    /// Claims the seat behind `token` for `addr`
    pub fn join(&mut self, token: &str, addr: SocketAddr, now: Instant) -> JoinOutcome {
        info!("Received join request from client {}", addr);

        if self.phase != Phase::Preparing {
            debug!("Ignoring join from {} in phase {:?}", addr, self.phase);
            return JoinOutcome::Rejected;
        }

        let Some(player_id) = self.tokens.player_for(token) else {
            warn!("Rejected join from {}: unknown token", addr);
            return JoinOutcome::Rejected;
        };

        let seat = &mut self.seats[player_id.index()];
        if let Some(existing) = seat.as_mut() {
            // A repeated join from the bound address still counts as a sign of life.
            if existing.addr == addr {
                existing.last_seen = now;
            }
            debug!(
                "Ignoring join from {}: player {} already registered",
                addr,
                player_id.number()
            );
            return JoinOutcome::Rejected;
        }

        *seat = Some(Seat {
            addr,
            last_seen: now,
        });
        *self.game.player_mut(player_id) = shared::Player::new(player_id);
        info!(
            "Registered client {} as player {} with token {}",
            addr,
            player_id.number(),
            token
        );

        if self.seats.iter().all(Option::is_some) {
            info!("All players have joined - starting match");
            self.phase = Phase::Started;
            for seat in self.seats.iter_mut().flatten() {
                seat.last_seen = now;
            }
            self.game.reset_ball(&mut self.rng);
            return JoinOutcome::Started(player_id);
        }

        JoinOutcome::Registered(player_id)
    }

    /// Sets a joined player's paddle direction. Returns false when the request was ignored.
    pub fn movement(&mut self, token: &str, direction: Direction, now: Instant) -> bool {
        if self.phase != Phase::Started {
            return false;
        }

        let Some(player_id) = self.tokens.player_for(token) else {
            debug!("Ignoring movement with unknown token");
            return false;
        };

        let Some(seat) = self.seats[player_id.index()].as_mut() else {
            return false;
        };

        seat.last_seen = now;
        self.game.player_mut(player_id).paddle_direction = direction;
        debug!(
            "Player {} sent movement direction {:?}",
            player_id.number(),
            direction
        );
        true
    }

    /// Runs one physics tick and returns everything that has to go out on the wire
    pub fn tick(&mut self, now: Instant) -> Vec<(SocketAddr, Message)> {
        if self.phase != Phase::Started {
            return Vec::new();
        }

        if let Some(player_id) = self.silent_player(now) {
            info!(
                "Player {} went silent - ending match",
                player_id.number()
            );
            return self.finish();
        }

        let scorer = self.game.step(&mut self.rng);
        let mut outgoing = self.snapshots();

        if let (Some(player_id), Some(max_score)) = (scorer, self.config.max_score) {
            if self.game.player(player_id).score >= max_score {
                info!(
                    "Player {} reached {} points - ending match",
                    player_id.number(),
                    max_score
                );
                outgoing.extend(self.finish());
            }
        }

        outgoing
    }

    /// Current frame for both seats, each stamped with the recipient's own token
    pub fn snapshots(&self) -> Vec<(SocketAddr, Message)> {
        PlayerId::ALL
            .iter()
            .filter_map(|&player_id| {
                let seat = self.seat(player_id)?;
                let snapshot = self.game.snapshot(self.tokens.token_for(player_id));
                Some((seat.addr, Message::State(snapshot)))
            })
            .collect()
    }

    fn silent_player(&self, now: Instant) -> Option<PlayerId> {
        let timeout = self.config.idle_timeout?;
        PlayerId::ALL.into_iter().find(|&player_id| {
            self.seat(player_id)
                .map(|seat| now.saturating_duration_since(seat.last_seen) > timeout)
                .unwrap_or(false)
        })
    }

    fn finish(&mut self) -> Vec<(SocketAddr, Message)> {
        self.phase = Phase::Finished;
        info!(
            "Match finished after {} frames - final score: [{} - {}]",
            self.game.frame,
            self.game.players[0].score,
            self.game.players[1].score
        );

        self.seats
            .iter()
            .flatten()
            .map(|seat| {
                (
                    seat.addr,
                    Message::Status {
                        phase: Phase::Finished,
                    },
                )
            })
            .collect()
    }
}
