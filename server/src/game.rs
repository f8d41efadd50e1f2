use log::{debug, info};
use rand::Rng;
use shared::{
    check_collision, Ball, Player, PlayerId, StateSnapshot, BALL_SPEED, PADDLE_HEIGHT,
    PADDLE_HIT_EDGE_FACTOR,
};

/// Per-tick ball displacement. Never leaves the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub frame: u64,
    pub ball: Ball,
    pub ball_velocity: Velocity,
    pub players: [Player; 2],
}

impl GameState {
    pub fn new() -> Self {
        Self {
            frame: 0,
            ball: Ball::centered(),
            ball_velocity: Velocity { x: 0.0, y: 0.0 },
            players: [
                Player::new(PlayerId::Player1),
                Player::new(PlayerId::Player2),
            ],
        }
    }

    pub fn player(&self, identifier: PlayerId) -> &Player {
        &self.players[identifier.index()]
    }

    pub fn player_mut(&mut self, identifier: PlayerId) -> &mut Player {
        &mut self.players[identifier.index()]
    }

    /// Puts the ball back on the centre spot with a random diagonal heading.
    pub fn reset_ball<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.ball = Ball::centered();
        self.ball_velocity = Velocity {
            x: random_speed(rng),
            y: random_speed(rng),
        };
    }

    /// Advances the simulation by one tick and returns the player who scored, if any.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<PlayerId> {
        self.ball.x += self.ball_velocity.x;
        self.ball.y += self.ball_velocity.y;

        if !(0.0 < self.ball.y && self.ball.y < 1.0) {
            self.ball_velocity.y = -self.ball_velocity.y;
        }

        let mut scorer = None;
        if !(0.0 < self.ball.x && self.ball.x < 1.0) {
            let player_id = if self.ball.x < 0.0 {
                PlayerId::Player2
            } else {
                PlayerId::Player1
            };

            self.player_mut(player_id).score += 1;
            info!(
                "Player {} scored - current score: [{} - {}]",
                player_id.number(),
                self.players[0].score,
                self.players[1].score
            );

            self.reset_ball(rng);
            scorer = Some(player_id);
        }

        for player in self.players.iter_mut() {
            player.move_paddle();
        }

        self.handle_paddle_collision();

        self.frame += 1;
        scorer
    }

    fn handle_paddle_collision(&mut self) {
        let defender = if self.ball.x <= 0.5 {
            PlayerId::Player1
        } else {
            PlayerId::Player2
        };

        // A ball already heading away from the paddle must not be turned around again.
        let approaching = match defender {
            PlayerId::Player1 => self.ball_velocity.x < 0.0,
            PlayerId::Player2 => self.ball_velocity.x > 0.0,
        };
        if !approaching {
            return;
        }

        if let Some(relative_hit) = paddle_hit(&self.ball, self.player(defender)) {
            debug!("Ball hit paddle at relative Y {:.2}", relative_hit);
            self.ball_velocity.x *= deflection_factor(relative_hit);
        }
    }

    pub fn snapshot(&self, token: &str) -> StateSnapshot {
        StateSnapshot {
            frame: self.frame,
            ball: self.ball,
            player_1: self.players[0].clone(),
            player_2: self.players[1].clone(),
            token: token.to_string(),
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

fn random_speed<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    if rng.gen_bool(0.5) {
        BALL_SPEED
    } else {
        -BALL_SPEED
    }
}

/// Where along the paddle the ball struck it, 0.0 at the top edge and 1.0 at the bottom.
pub fn paddle_hit(ball: &Ball, paddle: &Player) -> Option<f32> {
    let ball_bounds = ball.get_bounds();
    let paddle_bounds = paddle.get_bounds();

    if !check_collision(&ball_bounds, &paddle_bounds) {
        return None;
    }

    let hit_y = (ball_bounds.top.max(paddle_bounds.top)
        + ball_bounds.bottom.min(paddle_bounds.bottom))
        / 2.0;
    Some((hit_y - paddle_bounds.top) / PADDLE_HEIGHT)
}

/// Horizontal velocity multiplier for a paddle hit. Edge hits return the ball faster.
pub fn deflection_factor(relative_hit: f32) -> f32 {
    -(1.0 + PADDLE_HIT_EDGE_FACTOR * (relative_hit - 0.5).abs())
}
