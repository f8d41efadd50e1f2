use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest envelope any peer will send or accept, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 512;

pub const BALL_WIDTH: f32 = 0.015;
pub const BALL_HEIGHT: f32 = 0.015 * (16.0 / 9.0);
pub const BALL_SPEED: f32 = 0.0025;
pub const PADDLE_WIDTH: f32 = 0.015;
pub const PADDLE_HEIGHT: f32 = 0.15;
pub const PADDLE_SPEED: f32 = 0.015;
pub const PADDLE_HORIZONTAL_PADDING: f32 = 0.1;
pub const PADDLE_HIT_EDGE_FACTOR: f32 = 0.5;

pub const DEFAULT_COORDINATOR_PORT: u16 = 4999;
pub const DEFAULT_SERVER_PORT: u16 = 5001;
pub const SECRET_ENV: &str = "MULTI_PONG_SECRET";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),
    #[error("message of {size} bytes exceeds the {} byte limit", MAX_MESSAGE_SIZE)]
    Oversized { size: usize },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerId {
    Player1,
    Player2,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::Player1, PlayerId::Player2];

    pub fn index(self) -> usize {
        match self {
            PlayerId::Player1 => 0,
            PlayerId::Player2 => 1,
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Horizontal centre of this player's paddle. Player 1 defends the left edge.
    pub fn paddle_x(self) -> f32 {
        match self {
            PlayerId::Player1 => PADDLE_HORIZONTAL_PADDING,
            PlayerId::Player2 => 1.0 - PADDLE_HORIZONTAL_PADDING,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Stop,
    Up,
    Down,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Preparing,
    Started,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub identifier: PlayerId,
    pub paddle_direction: Direction,
    pub paddle_location: f32,
    pub score: u32,
}

impl Player {
    pub fn new(identifier: PlayerId) -> Self {
        Self {
            identifier,
            paddle_direction: Direction::Stop,
            paddle_location: 0.5,
            score: 0,
        }
    }

    /// Moves the paddle one tick in its current direction and keeps it on the court.
    pub fn move_paddle(&mut self) {
        match self.paddle_direction {
            Direction::Up => self.paddle_location -= PADDLE_SPEED,
            Direction::Down => self.paddle_location += PADDLE_SPEED,
            Direction::Stop => {}
        }

        self.paddle_location = self.paddle_location.clamp(0.0, 1.0);
    }

    pub fn get_bounds(&self) -> Bounds {
        Bounds::centered(
            self.identifier.paddle_x(),
            self.paddle_location,
            PADDLE_WIDTH,
            PADDLE_HEIGHT,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
}

impl Ball {
    pub fn centered() -> Self {
        Self { x: 0.5, y: 0.5 }
    }

    pub fn get_bounds(&self) -> Bounds {
        Bounds::centered(self.x, self.y, BALL_WIDTH, BALL_HEIGHT)
    }
}

/// Axis-aligned box in court coordinates, y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn centered(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            left: x - width / 2.0,
            right: x + width / 2.0,
            top: y - height / 2.0,
            bottom: y + height / 2.0,
        }
    }
}

pub fn check_collision(a: &Bounds, b: &Bounds) -> bool {
    a.left < b.right && a.right > b.left && a.top < b.bottom && a.bottom > b.top
}

/// Authoritative frame as broadcast to one recipient.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateSnapshot {
    pub frame: u64,
    pub ball: Ball,
    pub player_1: Player,
    pub player_2: Player,
    /// The recipient's own token.
    pub token: String,
}

impl StateSnapshot {
    pub fn player(&self, identifier: PlayerId) -> &Player {
        match identifier {
            PlayerId::Player1 => &self.player_1,
            PlayerId::Player2 => &self.player_2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Message {
    Search,
    Match {
        host: String,
        port: u16,
        token: String,
        player: PlayerId,
    },
    Join {
        token: String,
    },
    Movement {
        token: String,
        direction: Direction,
    },
    Query,
    Status {
        phase: Phase,
    },
    Prepare {
        secret: String,
    },
    Tokens {
        token_1: String,
        token_2: String,
    },
    State(StateSnapshot),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Search => "search",
            Message::Match { .. } => "match",
            Message::Join { .. } => "join",
            Message::Movement { .. } => "movement",
            Message::Query => "query",
            Message::Status { .. } => "status",
            Message::Prepare { .. } => "prepare",
            Message::Tokens { .. } => "tokens",
            Message::State(_) => "state",
        }
    }

    /// Serializes the envelope, refusing anything that would not fit in one datagram.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let data = bincode::serialize(self).map_err(ProtocolError::Encode)?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Oversized { size: data.len() });
        }
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Oversized { size: data.len() });
        }
        bincode::deserialize(data).map_err(ProtocolError::Decode)
    }
}
